//! End-of-session prize resolution and result summaries.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::constants::NO_PRIZE;
use crate::ladder::PrizeLadder;
use crate::lifelines::LifelineState;
use crate::numbers::{clamp_percentage, round_f64_to_i32, usize_to_f64};
use crate::questions::{Difficulty, Question};

/// Why a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndReason {
    /// Every question answered correctly
    Win,
    /// An incorrect answer was locked in
    Wrong,
    /// The player banked the current prize
    WalkAway,
    /// The answer timer ran out
    Timeout,
}

impl EndReason {
    pub const ALL: [Self; 4] = [Self::Win, Self::Wrong, Self::WalkAway, Self::Timeout];

    /// Wire label, e.g. `WALK_AWAY`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Win => "WIN",
            Self::Wrong => "WRONG",
            Self::WalkAway => "WALK_AWAY",
            Self::Timeout => "TIMEOUT",
        }
    }

    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|reason| reason.as_str() == label)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Win => "All Questions Answered Correctly",
            Self::WalkAway => "Walked Away",
            Self::Wrong => "Incorrect Answer",
            Self::Timeout => "Time Expired",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal answer log entry kept in the live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: u32,
    pub correct: bool,
    /// Original option index the player picked.
    pub chosen_option: usize,
    pub correct_option: usize,
}

impl AnswerRecord {
    #[must_use]
    pub const fn new(question: &Question, chosen_option: usize) -> Self {
        Self {
            question_id: question.id,
            correct: question.is_correct(chosen_option),
            chosen_option,
            correct_option: question.correct_answer,
        }
    }
}

/// Answer log entry as presented in a finished result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsweredQuestion {
    pub question_id: u32,
    pub correct: bool,
    pub chosen_option: usize,
    pub correct_option: usize,
    pub difficulty: Difficulty,
    pub question: String,
    pub options: Vec<String>,
    /// Ladder prize for this question's position.
    pub prize: String,
}

impl AnsweredQuestion {
    #[must_use]
    pub fn from_record(record: &AnswerRecord, question: &Question, prize: &str) -> Self {
        Self {
            question_id: record.question_id,
            correct: record.correct,
            chosen_option: record.chosen_option,
            correct_option: record.correct_option,
            difficulty: question.difficulty,
            question: question.text.clone(),
            options: question.options.clone(),
            prize: prize.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSessionResult {
    /// 0-based index of the question on screen when the session ended.
    pub current_question_index: usize,
    pub final_prize: String,
    pub last_answered_prize: String,
    pub last_checkpoint_prize: String,
    pub end_reason: EndReason,
    pub used_lifelines: LifelineState,
    pub answered_questions: Vec<AnsweredQuestion>,
    pub total_questions: usize,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl GameSessionResult {
    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.answered_questions.iter().filter(|q| q.correct).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatistics {
    pub correct_answers: usize,
    pub total_attempted: usize,
    /// Whole-number percentage of attempted questions answered correctly.
    pub accuracy: u32,
    pub highest_question: usize,
}

#[derive(Debug, Error)]
pub enum ResultStoreError {
    #[error("result store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode result: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Session-scoped slot holding the serialized last result.
pub trait ResultStore {
    /// # Errors
    ///
    /// Returns an error when the slot cannot be written.
    fn put(&self, json: String) -> Result<(), ResultStoreError>;

    /// # Errors
    ///
    /// Returns an error when the slot cannot be read.
    fn get(&self) -> Result<Option<String>, ResultStoreError>;

    /// # Errors
    ///
    /// Returns an error when the slot cannot be cleared.
    fn clear(&self) -> Result<(), ResultStoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryResultStore {
    slot: Mutex<Option<String>>,
    failing: bool,
}

impl MemoryResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every operation fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            slot: Mutex::new(None),
            failing: true,
        }
    }

    fn check(&self) -> Result<(), ResultStoreError> {
        if self.failing {
            return Err(ResultStoreError::Unavailable("memory slot disabled".into()));
        }
        Ok(())
    }
}

impl ResultStore for MemoryResultStore {
    fn put(&self, json: String) -> Result<(), ResultStoreError> {
        self.check()?;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
        Ok(())
    }

    fn get(&self) -> Result<Option<String>, ResultStoreError> {
        self.check()?;
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn clear(&self) -> Result<(), ResultStoreError> {
        self.check()?;
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

fn question_number(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Resolves final prizes against a ladder and keeps the latest result.
#[derive(Debug)]
pub struct ResultCalculator<S = MemoryResultStore> {
    ladder: PrizeLadder,
    store: S,
    current: Option<GameSessionResult>,
}

impl Default for ResultCalculator {
    fn default() -> Self {
        Self::new(PrizeLadder::default(), MemoryResultStore::new())
    }
}

impl<S: ResultStore> ResultCalculator<S> {
    #[must_use]
    pub const fn new(ladder: PrizeLadder, store: S) -> Self {
        Self {
            ladder,
            store,
            current: None,
        }
    }

    #[must_use]
    pub const fn ladder(&self) -> &PrizeLadder {
        &self.ladder
    }

    pub fn ladder_mut(&mut self) -> &mut PrizeLadder {
        &mut self.ladder
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Prize awarded when a session ends.
    ///
    /// `attempted_index` is the 0-based index of the question on screen.
    #[must_use]
    pub fn calculate_final_prize(
        &self,
        end_reason: EndReason,
        attempted_index: usize,
        correct_so_far: usize,
        total_questions: usize,
    ) -> String {
        let correct = question_number(correct_so_far);
        let prize = match end_reason {
            EndReason::Win => self.ladder.current_prize(question_number(total_questions)),
            EndReason::Wrong | EndReason::Timeout => self
                .ladder
                .guaranteed_prize(question_number(attempted_index.saturating_add(1)), correct),
            EndReason::WalkAway => self.ladder.current_prize(correct),
        };
        prize.to_string()
    }

    /// Same as [`Self::calculate_final_prize`] for a wire label; unknown labels yield `$0`.
    #[must_use]
    pub fn calculate_final_prize_for_label(
        &self,
        end_reason: &str,
        attempted_index: usize,
        correct_so_far: usize,
        total_questions: usize,
    ) -> String {
        EndReason::parse(end_reason).map_or_else(
            || NO_PRIZE.to_string(),
            |reason| {
                self.calculate_final_prize(reason, attempted_index, correct_so_far, total_questions)
            },
        )
    }

    /// Package a finished session, remember it and persist it to the store.
    ///
    /// Store failures are logged and otherwise ignored.
    pub fn create_session_result(
        &mut self,
        end_reason: EndReason,
        current_question_index: usize,
        answered_questions: Vec<AnsweredQuestion>,
        used_lifelines: LifelineState,
        total_questions: usize,
    ) -> GameSessionResult {
        let correct = answered_questions.iter().filter(|q| q.correct).count();
        let attempted_number = question_number(current_question_index.saturating_add(1));
        let result = GameSessionResult {
            current_question_index,
            final_prize: self.calculate_final_prize(
                end_reason,
                current_question_index,
                correct,
                total_questions,
            ),
            last_answered_prize: self.ladder.current_prize(question_number(correct)).to_string(),
            last_checkpoint_prize: self
                .ladder
                .guaranteed_prize(attempted_number, question_number(correct))
                .to_string(),
            end_reason,
            used_lifelines,
            answered_questions,
            total_questions,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        log::debug!(
            "session ended: {end_reason} after {correct} correct, prize {}",
            result.final_prize
        );
        self.current = Some(result.clone());
        self.persist(&result);
        result
    }

    fn persist(&self, result: &GameSessionResult) {
        let outcome = serde_json::to_string(result)
            .map_err(ResultStoreError::from)
            .and_then(|json| self.store.put(json));
        if let Err(err) = outcome {
            log::error!("Failed to persist game result: {err}");
        }
    }

    #[must_use]
    pub const fn current_result(&self) -> Option<&GameSessionResult> {
        self.current.as_ref()
    }

    /// Last result written to the store, if it is readable.
    #[must_use]
    pub fn persisted_result(&self) -> Option<GameSessionResult> {
        match self.store.get() {
            Ok(Some(json)) => serde_json::from_str(&json)
                .map_err(|err| log::error!("Failed to decode persisted game result: {err}"))
                .ok(),
            Ok(None) => None,
            Err(err) => {
                log::error!("Failed to retrieve persisted game result: {err}");
                None
            }
        }
    }

    pub fn clear_result(&mut self) {
        self.current = None;
        if let Err(err) = self.store.clear() {
            log::error!("Failed to clear persisted game result: {err}");
        }
    }
}

#[must_use]
pub fn statistics(result: &GameSessionResult) -> SessionStatistics {
    let correct_answers = result.correct_count();
    let total_attempted = result.answered_questions.len();
    let accuracy = if total_attempted == 0 {
        0
    } else {
        let ratio = usize_to_f64(correct_answers) / usize_to_f64(total_attempted) * 100.0;
        clamp_percentage(round_f64_to_i32(ratio))
    };
    SessionStatistics {
        correct_answers,
        total_attempted,
        accuracy,
        highest_question: correct_answers,
    }
}

/// One-line banner for the results screen.
#[must_use]
pub fn headline(result: &GameSessionResult) -> String {
    match result.end_reason {
        EndReason::Win => format!("🎉 You Won {}! 🎉", result.final_prize),
        EndReason::WalkAway => format!("💰 You Walked Away with {}!", result.final_prize),
        EndReason::Wrong | EndReason::Timeout if result.final_prize == NO_PRIZE => {
            "Game Over".to_string()
        }
        EndReason::Wrong | EndReason::Timeout => {
            format!("Game Over – {} Secured", result.final_prize)
        }
    }
}
