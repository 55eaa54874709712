//! Millionaire Game Engine
//!
//! Platform-agnostic core for a fifteen-rung prize-ladder trivia game:
//! reproducible answer shuffles, checkpoint arithmetic, lifelines and
//! resumable session persistence. No UI lives here.

pub mod constants;
pub mod ladder;
pub mod lifelines;
pub mod numbers;
pub mod persistence;
pub mod questions;
pub mod result;
pub mod rng;
pub mod shuffle;

// Re-export commonly used types
pub use constants::{CURRENT_SCHEMA_VERSION, NO_PRIZE};
pub use ladder::{LadderConfigError, PrizeLadder, PrizeLadderConfig, PrizeLadderLevel};
pub use lifelines::{
    AudienceVote, Lifeline, LifelineState, PhoneFriendHint, ask_audience, ask_audience_with_rng,
    fifty_fifty, fifty_fifty_rendered, fifty_fifty_with_rng, phone_a_friend,
    phone_a_friend_with_rng,
};
pub use persistence::{
    BackendError, FileBackend, MemoryBackend, PersistenceConfig, PersistenceError, SessionState,
    SessionStore, SessionSummary, StorageAvailability, StorageBackend, TierAvailability,
    generate_session_key,
};
pub use questions::{
    CsvQuestionSource, Difficulty, Question, QuestionSource, QuestionSourceError,
    parse_question_csv, select_with_progression, sort_by_difficulty,
};
pub use result::{
    AnswerRecord, AnsweredQuestion, EndReason, GameSessionResult, MemoryResultStore,
    ResultCalculator, ResultStore, ResultStoreError, SessionStatistics, headline, statistics,
};
pub use rng::SeededRandom;
pub use shuffle::{RenderOrder, build_render_orders, derive_seed, shuffle_options};

use rand::Rng;

/// Wires a question bank, a prize ladder and a session store together.
pub struct GameEngine<Q>
where
    Q: QuestionSource,
{
    questions: Q,
    ladder: PrizeLadder,
    store: SessionStore,
}

impl<Q> GameEngine<Q>
where
    Q: QuestionSource,
{
    pub const fn new(questions: Q, ladder: PrizeLadder, store: SessionStore) -> Self {
        Self {
            questions,
            ladder,
            store,
        }
    }

    pub const fn ladder(&self) -> &PrizeLadder {
        &self.ladder
    }

    pub const fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Draw a question set, fix its render orders and build the initial state.
    ///
    /// # Errors
    ///
    /// Returns an error if the question bank cannot be loaded.
    pub fn create_session(
        &self,
        session_key: &str,
        rng: &mut impl Rng,
    ) -> Result<SessionState, Q::Error> {
        let bank = self.questions.load_questions()?;
        let selected = select_with_progression(&bank, rng);
        if selected.len() < self.ladder.total_questions() {
            log::warn!(
                "question bank filled {} of {} ladder rungs",
                selected.len(),
                self.ladder.total_questions()
            );
        }
        let orders = build_render_orders(session_key, &selected);
        Ok(self
            .store
            .create_initial_state(session_key, selected, orders))
    }

    /// Start a session under a freshly generated key.
    ///
    /// # Errors
    ///
    /// Returns an error if the question bank cannot be loaded.
    pub fn start_session(&self, rng: &mut impl Rng) -> Result<SessionState, Q::Error> {
        let key = self.store.generate_session_key();
        self.create_session(&key, rng)
    }

    /// Reload a saved session by key.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when no storage tier can be read.
    pub async fn resume_session(
        &self,
        session_key: &str,
    ) -> Result<Option<SessionState>, PersistenceError> {
        self.store.load_state(session_key).await
    }
}
