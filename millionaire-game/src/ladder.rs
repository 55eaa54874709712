//! Prize ladder configuration and checkpoint arithmetic.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::constants::{DEFAULT_LADDER, NO_PRIZE};

/// One rung of the ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeLadderLevel {
    /// 1-based position; question `n` awards this prize when answered correctly.
    pub question_number: u32,
    /// Formatted prize string. Never parsed.
    pub prize: String,
    #[serde(default)]
    pub is_checkpoint: bool,
}

impl PrizeLadderLevel {
    #[must_use]
    pub fn new(question_number: u32, prize: impl Into<String>, is_checkpoint: bool) -> Self {
        Self {
            question_number,
            prize: prize.into(),
            is_checkpoint,
        }
    }
}

#[derive(Debug, Error)]
pub enum LadderConfigError {
    #[error("ladder lists question {0} more than once")]
    DuplicateQuestion(u32),
    #[error("ladder has no levels")]
    Empty,
    #[error("failed to parse ladder config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ordered list of ladder levels. Gaps in numbering are tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeLadderConfig {
    pub levels: Vec<PrizeLadderLevel>,
}

impl Default for PrizeLadderConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl PrizeLadderConfig {
    /// The fifteen-level ladder with checkpoints at questions 5 and 10.
    #[must_use]
    pub fn default_config() -> Self {
        Self {
            levels: DEFAULT_LADDER
                .iter()
                .map(|&(number, prize, checkpoint)| {
                    PrizeLadderLevel::new(number, prize, checkpoint)
                })
                .collect(),
        }
    }

    /// Parse and validate a ladder from JSON.
    ///
    /// Accepts either `{"levels": [...]}` or a bare array of levels.
    ///
    /// # Errors
    ///
    /// Returns [`LadderConfigError`] if the JSON is malformed or the ladder fails
    /// [`PrizeLadderConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self, LadderConfigError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Wrapped(PrizeLadderConfig),
            Bare(Vec<PrizeLadderLevel>),
        }

        let config = match serde_json::from_str::<Wire>(json)? {
            Wire::Wrapped(config) => config,
            Wire::Bare(levels) => Self { levels },
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`LadderConfigError::Empty`] for a ladder with no levels and
    /// [`LadderConfigError::DuplicateQuestion`] when a question number repeats.
    pub fn validate(&self) -> Result<(), LadderConfigError> {
        if self.levels.is_empty() {
            return Err(LadderConfigError::Empty);
        }
        let mut seen = BTreeSet::new();
        for level in &self.levels {
            if !seen.insert(level.question_number) {
                return Err(LadderConfigError::DuplicateQuestion(level.question_number));
            }
        }
        Ok(())
    }
}

/// Prize lookups against an instance-held ladder config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrizeLadder {
    config: PrizeLadderConfig,
}

impl PrizeLadder {
    #[must_use]
    pub const fn new(config: PrizeLadderConfig) -> Self {
        Self { config }
    }

    /// Replace the ladder wholesale.
    pub fn set_config(&mut self, config: PrizeLadderConfig) {
        log::debug!("prize ladder replaced with {} levels", config.levels.len());
        self.config = config;
    }

    #[must_use]
    pub const fn config(&self) -> &PrizeLadderConfig {
        &self.config
    }

    #[must_use]
    pub fn levels(&self) -> &[PrizeLadderLevel] {
        &self.config.levels
    }

    #[must_use]
    pub fn level(&self, question_number: u32) -> Option<&PrizeLadderLevel> {
        self.config
            .levels
            .iter()
            .find(|level| level.question_number == question_number)
    }

    /// Prize awarded for answering question `question_number` correctly.
    #[must_use]
    pub fn prize_for_question(&self, question_number: u32) -> &str {
        self.level(question_number)
            .map_or(NO_PRIZE, |level| level.prize.as_str())
    }

    #[must_use]
    pub fn is_checkpoint(&self, question_number: u32) -> bool {
        self.level(question_number)
            .is_some_and(|level| level.is_checkpoint)
    }

    /// Prize kept after a wrong answer or timeout.
    ///
    /// Only `correct_so_far` drives the result: the highest checkpoint at or
    /// below it, or `$0` when there is none.
    #[must_use]
    pub fn guaranteed_prize(&self, _attempted_question: u32, correct_so_far: u32) -> &str {
        if correct_so_far == 0 {
            return NO_PRIZE;
        }
        self.config
            .levels
            .iter()
            .filter(|level| level.is_checkpoint && level.question_number <= correct_so_far)
            .max_by_key(|level| level.question_number)
            .map_or(NO_PRIZE, |level| level.prize.as_str())
    }

    /// Prize already banked after `correct_so_far` correct answers.
    #[must_use]
    pub fn current_prize(&self, correct_so_far: u32) -> &str {
        if correct_so_far == 0 {
            return NO_PRIZE;
        }
        self.prize_for_question(correct_so_far)
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.config.levels.len()
    }

    /// Checkpoint levels in ladder order.
    #[must_use]
    pub fn checkpoints(&self) -> Vec<&PrizeLadderLevel> {
        self.config
            .levels
            .iter()
            .filter(|level| level.is_checkpoint)
            .collect()
    }
}
