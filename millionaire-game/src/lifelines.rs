//! Lifeline resolution: 50:50, Ask the Audience and Phone a Friend.
//!
//! Every resolver takes its randomness from the caller so tests and replays
//! can pin the outcome. The plain entry points draw from the thread RNG.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    AUDIENCE_CORRECT_MIN, AUDIENCE_CORRECT_SPAN, AUDIENCE_TOTAL, FIFTY_FIFTY_REMOVALS,
    PHONE_CONFIDENCE_HIGH, PHONE_CONFIDENCE_HIGH_CUTOFF, PHONE_CONFIDENCE_LOW,
    PHONE_CONFIDENCE_MID, PHONE_CONFIDENCE_MID_CUTOFF, PHONE_CONFIDENCE_UNSURE,
    PHONE_FRIEND_ACCURACY,
};
use crate::numbers::{clamp_percentage, round_f64_to_i32, usize_to_f64};
use crate::questions::{OptionIndexSet, Question};
use crate::shuffle::RenderOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Lifeline {
    FiftyFifty,
    AskAudience,
    PhoneFriend,
}

impl Lifeline {
    pub const ALL: [Self; 3] = [Self::FiftyFifty, Self::AskAudience, Self::PhoneFriend];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FiftyFifty => "50:50",
            Self::AskAudience => "Ask the Audience",
            Self::PhoneFriend => "Phone a Friend",
        }
    }
}

impl fmt::Display for Lifeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which lifelines a session has spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifelineState {
    pub fifty_fifty: bool,
    pub ask_audience: bool,
    pub phone_friend: bool,
}

impl LifelineState {
    /// Mark a lifeline spent. Returns `false` if it was already used.
    pub fn mark_used(&mut self, lifeline: Lifeline) -> bool {
        let slot = match lifeline {
            Lifeline::FiftyFifty => &mut self.fifty_fifty,
            Lifeline::AskAudience => &mut self.ask_audience,
            Lifeline::PhoneFriend => &mut self.phone_friend,
        };
        !std::mem::replace(slot, true)
    }

    #[must_use]
    pub const fn is_used(&self, lifeline: Lifeline) -> bool {
        match lifeline {
            Lifeline::FiftyFifty => self.fifty_fifty,
            Lifeline::AskAudience => self.ask_audience,
            Lifeline::PhoneFriend => self.phone_friend,
        }
    }

    #[must_use]
    pub const fn any_used(&self) -> bool {
        self.fifty_fifty || self.ask_audience || self.phone_friend
    }

    #[must_use]
    pub fn used_count(&self) -> usize {
        Lifeline::ALL
            .into_iter()
            .filter(|lifeline| self.is_used(*lifeline))
            .count()
    }

    /// Lifelines still available, in display order.
    #[must_use]
    pub fn remaining(&self) -> Vec<Lifeline> {
        Lifeline::ALL
            .into_iter()
            .filter(|lifeline| !self.is_used(*lifeline))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceVote {
    pub option_index: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneFriendHint {
    pub suggested_answer: usize,
    pub confidence: String,
}

/// Two incorrect option indices to hide, chosen at random.
pub fn fifty_fifty_with_rng(question: &Question, rng: &mut impl Rng) -> OptionIndexSet {
    let mut incorrect = question.incorrect_indices();
    incorrect.shuffle(rng);
    incorrect.truncate(FIFTY_FIFTY_REMOVALS);
    incorrect
}

#[must_use]
pub fn fifty_fifty(question: &Question) -> OptionIndexSet {
    fifty_fifty_with_rng(question, &mut rand::thread_rng())
}

/// 50:50 removals expressed as rendered positions, the form the session state stores.
pub fn fifty_fifty_rendered(
    question: &Question,
    order: &RenderOrder,
    rng: &mut impl Rng,
) -> Vec<usize> {
    order.rendered_positions(&fifty_fifty_with_rng(question, rng))
}

/// Simulated audience poll. Percentages are whole numbers summing to exactly 100,
/// with the correct option taking roughly 45-80%.
pub fn ask_audience_with_rng(question: &Question, rng: &mut impl Rng) -> Vec<AudienceVote> {
    let correct_share = AUDIENCE_CORRECT_MIN + rng.gen_range(0.0..1.0) * AUDIENCE_CORRECT_SPAN;
    let remaining = 100.0 - correct_share;

    let incorrect = question.incorrect_indices();
    let weights: Vec<f64> = incorrect.iter().map(|_| rng.gen_range(0.0..1.0)).collect();
    let weight_sum: f64 = weights.iter().sum();

    let mut shares = vec![0_i32; question.option_count()];
    if let Some(slot) = shares.get_mut(question.correct_answer) {
        *slot = round_f64_to_i32(correct_share);
    }
    for (idx, weight) in incorrect.iter().zip(&weights) {
        let share = if weight_sum > 0.0 {
            weight / weight_sum * remaining
        } else {
            remaining / usize_to_f64(incorrect.len())
        };
        shares[*idx] = round_f64_to_i32(share);
    }

    let total: i32 = shares.iter().sum();
    if total != AUDIENCE_TOTAL
        && let Some(slot) = shares.get_mut(question.correct_answer)
    {
        *slot += AUDIENCE_TOTAL - total;
    }

    shares
        .into_iter()
        .enumerate()
        .map(|(option_index, share)| AudienceVote {
            option_index,
            percentage: clamp_percentage(share),
        })
        .collect()
}

#[must_use]
pub fn ask_audience(question: &Question) -> Vec<AudienceVote> {
    ask_audience_with_rng(question, &mut rand::thread_rng())
}

/// A friend's guess: right 80% of the time with graded confidence, otherwise a
/// random wrong option delivered with hedging.
pub fn phone_a_friend_with_rng(question: &Question, rng: &mut impl Rng) -> PhoneFriendHint {
    if rng.gen_bool(PHONE_FRIEND_ACCURACY) {
        let level: f64 = rng.gen_range(0.0..1.0);
        let confidence = if level < PHONE_CONFIDENCE_HIGH_CUTOFF {
            PHONE_CONFIDENCE_HIGH
        } else if level < PHONE_CONFIDENCE_MID_CUTOFF {
            PHONE_CONFIDENCE_MID
        } else {
            PHONE_CONFIDENCE_LOW
        };
        return PhoneFriendHint {
            suggested_answer: question.correct_answer,
            confidence: confidence.to_string(),
        };
    }

    let incorrect = question.incorrect_indices();
    let suggested_answer = incorrect
        .choose(rng)
        .copied()
        .unwrap_or(question.correct_answer);
    PhoneFriendHint {
        suggested_answer,
        confidence: PHONE_CONFIDENCE_UNSURE.to_string(),
    }
}

#[must_use]
pub fn phone_a_friend(question: &Question) -> PhoneFriendHint {
    phone_a_friend_with_rng(question, &mut rand::thread_rng())
}
