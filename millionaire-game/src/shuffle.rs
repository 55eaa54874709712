//! Deterministic per-session answer shuffling.
//!
//! A render order is derived from `(session key, question id)` only, so a
//! reloaded session reproduces the exact option layout it was saved with.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::DEBUG_ENV_VAR;
use crate::questions::Question;
use crate::rng::SeededRandom;

#[cfg(debug_assertions)]
fn debug_log_enabled() -> bool {
    matches!(std::env::var(DEBUG_ENV_VAR), Ok(val) if val != "0")
}

#[cfg(not(debug_assertions))]
const fn debug_log_enabled() -> bool {
    false
}

/// Number of options every rendered question carries.
pub const OPTION_SLOTS: usize = 4;

/// Permutation mapping rendered position to original option index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[usize; OPTION_SLOTS]", into = "[usize; OPTION_SLOTS]")]
pub struct RenderOrder([usize; OPTION_SLOTS]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("render order {0:?} is not a permutation of 0..4")]
pub struct NotAPermutation(pub [usize; OPTION_SLOTS]);

impl TryFrom<[usize; OPTION_SLOTS]> for RenderOrder {
    type Error = NotAPermutation;

    fn try_from(slots: [usize; OPTION_SLOTS]) -> Result<Self, Self::Error> {
        let mut seen = [false; OPTION_SLOTS];
        for &slot in &slots {
            match seen.get_mut(slot) {
                Some(flag) if !*flag => *flag = true,
                _ => return Err(NotAPermutation(slots)),
            }
        }
        Ok(Self(slots))
    }
}

impl From<RenderOrder> for [usize; OPTION_SLOTS] {
    fn from(order: RenderOrder) -> Self {
        order.0
    }
}

impl Default for RenderOrder {
    fn default() -> Self {
        Self::identity()
    }
}

impl RenderOrder {
    #[must_use]
    pub const fn identity() -> Self {
        Self([0, 1, 2, 3])
    }

    #[must_use]
    pub const fn as_array(&self) -> &[usize; OPTION_SLOTS] {
        &self.0
    }

    /// Original option index shown at `rendered` position.
    #[must_use]
    pub fn original_index(&self, rendered: usize) -> Option<usize> {
        self.0.get(rendered).copied()
    }

    /// Rendered position where `original` option appears.
    #[must_use]
    pub fn rendered_position(&self, original: usize) -> Option<usize> {
        self.0.iter().position(|idx| *idx == original)
    }

    /// Map a list of original option indices to their rendered positions.
    #[must_use]
    pub fn rendered_positions(&self, originals: &[usize]) -> Vec<usize> {
        originals
            .iter()
            .filter_map(|idx| self.rendered_position(*idx))
            .collect()
    }

    /// Options in the order they should be displayed.
    #[must_use]
    pub fn apply<T: Clone>(&self, options: &[T]) -> Vec<T> {
        self.0
            .iter()
            .filter_map(|idx| options.get(*idx).cloned())
            .collect()
    }
}

/// Derive the shuffle seed for one question of one session.
///
/// Folds the UTF-16 code units of the key into the question id with 32-bit
/// two's-complement wraparound, then takes the unsigned absolute value.
#[must_use]
pub fn derive_seed(session_key: &str, question_id: u32) -> u32 {
    if session_key.is_empty() {
        return question_id;
    }
    let acc = session_key
        .encode_utf16()
        .fold(question_id.cast_signed(), |acc, unit| {
            acc.wrapping_shl(5)
                .wrapping_sub(acc)
                .wrapping_add(i32::from(unit))
        });
    acc.unsigned_abs()
}

/// Render order for one question of one session.
#[must_use]
pub fn shuffle_options(session_key: &str, question_id: u32) -> RenderOrder {
    let seed = derive_seed(session_key, question_id);
    let shuffled = SeededRandom::new(seed).shuffle(RenderOrder::identity().as_array());
    let mut slots = [0; OPTION_SLOTS];
    slots.copy_from_slice(&shuffled);
    debug_assert!(
        RenderOrder::try_from(slots).is_ok(),
        "shuffle produced a non-permutation"
    );
    if debug_log_enabled() {
        log::debug!("shuffle key={session_key} question={question_id} seed={seed} order={slots:?}");
    }
    RenderOrder(slots)
}

/// One render order per question, in question order. Computed once at session start.
#[must_use]
pub fn build_render_orders(session_key: &str, questions: &[Question]) -> Vec<RenderOrder> {
    questions
        .iter()
        .map(|q| shuffle_options(session_key, q.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::Difficulty;
    use std::collections::HashMap;

    fn reference_hash(key: &str, question_id: u32) -> u32 {
        // Same fold computed in i64 and truncated explicitly after every step.
        let mut hash = i64::from(question_id);
        for unit in key.encode_utf16() {
            let shifted = ((hash << 5) as i32) as i64;
            hash = shifted - hash + i64::from(unit);
            hash = (hash as i32) as i64;
        }
        u32::try_from(hash.abs()).unwrap()
    }

    #[test]
    fn derive_seed_is_pure() {
        assert_eq!(derive_seed("GAME_123", 1), derive_seed("GAME_123", 1));
    }

    #[test]
    fn derive_seed_is_sensitive_to_both_inputs() {
        let base = derive_seed("GAME_123", 1);
        assert_ne!(base, derive_seed("GAME_456", 1));
        assert_ne!(base, derive_seed("GAME_123", 2));
    }

    #[test]
    fn derive_seed_matches_truncating_reference() {
        let keys = [
            "GAME_123",
            "G_lzq8a1_x9k2mp",
            "a much longer session key with spaces",
            "ü-ключ-鍵",
        ];
        for key in keys {
            for id in [0, 1, 7, 42, 1_000] {
                assert_eq!(derive_seed(key, id), reference_hash(key, id), "{key}/{id}");
            }
        }
    }

    #[test]
    fn derive_seed_of_short_keys_is_exact() {
        // ((1 << 5) - 1) + 'A'
        assert_eq!(derive_seed("A", 1), 31 + 65);
        assert_eq!(derive_seed("", 9), 9);
    }

    #[test]
    fn derive_seed_handles_wraparound() {
        for id in 0..200 {
            let seed = derive_seed("ZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ", id);
            assert_eq!(seed, reference_hash("ZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ", id));
        }
    }

    #[test]
    fn shuffle_options_is_a_reproducible_permutation() {
        for id in 0..100 {
            let first = shuffle_options("GAME_123", id);
            let second = shuffle_options("GAME_123", id);
            assert_eq!(first, second);
            let mut sorted = *first.as_array();
            sorted.sort_unstable();
            assert_eq!(sorted, [0, 1, 2, 3]);
        }
    }

    #[test]
    fn shuffle_options_varies_across_keys() {
        let orders = |key: &str| -> Vec<RenderOrder> {
            (0..20).map(|id| shuffle_options(key, id)).collect()
        };
        assert_ne!(orders("GAME_123"), orders("GAME_456"));
    }

    #[test]
    fn shuffle_spreads_correct_answer_positions() {
        let mut positions: HashMap<usize, usize> = HashMap::new();
        for id in 0..400 {
            let order = shuffle_options("G_distribution", id);
            let rendered = order.rendered_position(0).unwrap();
            *positions.entry(rendered).or_default() += 1;
        }
        assert_eq!(positions.len(), 4, "every slot should be used: {positions:?}");
        assert!(positions.values().all(|count| *count > 40), "{positions:?}");
    }

    #[test]
    fn render_order_maps_both_directions() {
        let order = RenderOrder::try_from([2, 0, 3, 1]).unwrap();
        assert_eq!(order.original_index(0), Some(2));
        assert_eq!(order.rendered_position(2), Some(0));
        assert_eq!(order.rendered_positions(&[1, 3]), vec![3, 2]);
        assert_eq!(order.original_index(9), None);
        assert_eq!(order.apply(&["a", "b", "c", "d"]), vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn render_order_rejects_non_permutations() {
        assert!(RenderOrder::try_from([0, 0, 1, 2]).is_err());
        assert!(RenderOrder::try_from([0, 1, 2, 4]).is_err());
        let err = RenderOrder::try_from([3, 3, 3, 3]).unwrap_err();
        assert_eq!(err, NotAPermutation([3, 3, 3, 3]));
        assert_eq!(
            err.to_string(),
            "render order [3, 3, 3, 3] is not a permutation of 0..4"
        );
        let bad: Result<RenderOrder, _> = serde_json::from_str("[1,1,2,3]");
        assert!(bad.is_err());
        let good: RenderOrder = serde_json::from_str("[3,2,1,0]").unwrap();
        assert_eq!(serde_json::to_string(&good).unwrap(), "[3,2,1,0]");
    }

    #[test]
    fn build_render_orders_follows_question_order() {
        let questions: Vec<Question> = [5, 9, 13]
            .into_iter()
            .map(|id| Question {
                id,
                text: String::new(),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: 0,
                difficulty: Difficulty::Easy,
            })
            .collect();
        let orders = build_render_orders("G_table", &questions);
        assert_eq!(orders.len(), 3);
        assert_eq!(orders[1], shuffle_options("G_table", 9));
    }
}
