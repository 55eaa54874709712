use anyhow::{Context, Result, bail};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use regex::Regex;
use std::collections::BTreeSet;

const DEFAULT_SEED: u64 = 1337;
/// Seed count behind the `all` keyword.
const SWEEP_SIZE: u64 = 100;
const KEY_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Resolve a list of CLI seed arguments into concrete seeds.
///
/// Supports literal integers (negative values fold to their magnitude),
/// inclusive ranges such as `10..20`, and the keyword `all`, which expands to
/// a fixed sweep starting at 1.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<u64>> {
    let range = Regex::new(r"^(\d+)\.\.(\d+)$").context("seed range pattern")?;
    let mut seeds = BTreeSet::new();

    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        if token.eq_ignore_ascii_case("all") {
            seeds.extend(1..=SWEEP_SIZE);
            continue;
        }

        if let Some(caps) = range.captures(token) {
            let start: u64 = caps[1].parse()?;
            let end: u64 = caps[2].parse()?;
            if start > end {
                bail!("Seed range {token} runs backwards");
            }
            seeds.extend(start..=end);
            continue;
        }

        if let Ok(value) = token.parse::<i64>() {
            seeds.insert(value.unsigned_abs());
            continue;
        }

        if let Ok(value) = token.parse::<u64>() {
            seeds.insert(value);
            continue;
        }

        bail!("Unrecognized seed token: {token}");
    }

    if seeds.is_empty() {
        seeds.insert(DEFAULT_SEED);
    }

    Ok(seeds.into_iter().collect())
}

/// Reproducible session key for a seed, in the same `G_<stamp>_<suffix>` shape
/// live sessions use.
#[must_use]
pub fn session_key_for_seed(seed: u64) -> String {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let suffix: String = (0..6)
        .map(|_| char::from(KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())]))
        .collect();
    format!("G_{seed:x}_{suffix}")
}
