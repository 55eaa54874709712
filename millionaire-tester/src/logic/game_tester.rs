use anyhow::{Context, Result, bail};
use millionaire_game::{
    CsvQuestionSource, GameEngine, GameSessionResult, PrizeLadder, PrizeLadderConfig,
    SessionStore,
};
use std::path::Path;
use std::sync::Arc;

use crate::logic::policy::PlayStrategy;
use crate::logic::seeds::session_key_for_seed;
use crate::logic::simulation::{SimulationSession, TurnRecord};

const DEFAULT_QUESTION_BANK: &str = include_str!("../../assets/questions.csv");

/// Upper bound on decisions per session; 15 answers plus 3 lifelines fit easily.
const MAX_TURNS: usize = 64;

/// Collection of immutable data required to run a simulation.
#[derive(Debug, Clone)]
pub struct TesterAssets {
    questions: CsvQuestionSource,
    ladder: PrizeLadder,
}

impl TesterAssets {
    /// Bundled question bank over the default ladder.
    #[must_use]
    pub fn load_default() -> Self {
        Self {
            questions: CsvQuestionSource::from_text("bundled questions.csv", DEFAULT_QUESTION_BANK),
            ladder: PrizeLadder::default(),
        }
    }

    /// Replace the question bank with a CSV file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    pub fn with_questions_file(mut self, path: &Path) -> Result<Self> {
        self.questions = CsvQuestionSource::from_path(path)
            .with_context(|| format!("failed to load questions from {}", path.display()))?;
        Ok(self)
    }

    /// Replace the ladder with a JSON config from disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or fails validation.
    pub fn with_ladder_file(mut self, path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ladder {}", path.display()))?;
        let config = PrizeLadderConfig::from_json(&json)
            .with_context(|| format!("invalid ladder config {}", path.display()))?;
        self.ladder = PrizeLadder::new(config);
        Ok(self)
    }

    #[must_use]
    pub const fn ladder(&self) -> &PrizeLadder {
        &self.ladder
    }
}

/// Configuration for a scripted run.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub strategy: PlayStrategy,
    /// Reload from storage after every n-th answer.
    pub reload_every: Option<usize>,
    /// Fresh store for this plan instead of the tester's shared one.
    pub store: Option<fn() -> SessionStore>,
    pub expectations: Vec<SimulationExpectation>,
}

impl SimulationPlan {
    #[must_use]
    pub const fn new(strategy: PlayStrategy) -> Self {
        Self {
            strategy,
            reload_every: None,
            store: None,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_reload_every(mut self, answers: usize) -> Self {
        self.reload_every = Some(answers);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: fn() -> SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: SimulationExpectation) -> Self {
        self.expectations.push(expectation);
        self
    }
}

/// Assertion hook run after a simulation completes.
pub type SimulationExpectation = fn(&SimulationSummary) -> Result<()>;

/// Complete record of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub seed: u64,
    pub session_key: String,
    pub strategy: PlayStrategy,
    pub turns: Vec<TurnRecord>,
    pub result: GameSessionResult,
    pub questions_drawn: usize,
    pub reloads: usize,
    /// Reloads whose resumed state differed from the live one.
    pub resume_mismatches: usize,
    /// Whether the finished session was still readable from storage.
    pub leftover_state: bool,
    pub active_backend: Option<String>,
}

/// Headless deterministic runner for the trivia engine.
#[derive(Clone)]
pub struct GameTester {
    assets: Arc<TesterAssets>,
    store: SessionStore,
    verbose: bool,
}

impl GameTester {
    pub const fn new(assets: Arc<TesterAssets>, store: SessionStore, verbose: bool) -> Self {
        Self {
            assets,
            store,
            verbose,
        }
    }

    /// Tester over the bundled assets and an in-memory store.
    #[must_use]
    pub fn in_memory(verbose: bool) -> Self {
        Self::new(
            Arc::new(TesterAssets::load_default()),
            SessionStore::in_memory(),
            verbose,
        )
    }

    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    /// Play one session to the end under `plan`.
    ///
    /// # Errors
    ///
    /// Returns an error when the session cannot be created, persisted or
    /// reloaded, or when it fails to finish.
    pub async fn run_plan(&self, plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
        let store = plan.store.map_or_else(|| self.store.clone(), |build| build());
        let engine = GameEngine::new(
            self.assets.questions.clone(),
            self.assets.ladder.clone(),
            store.clone(),
        );
        let session_key = session_key_for_seed(seed);
        let mut session = SimulationSession::start(&engine, &session_key, seed).await?;
        let questions_drawn = session.state().total_questions();

        if self.verbose {
            println!(
                "   ↳ session {session_key}: {questions_drawn} questions, strategy {}",
                plan.strategy
            );
        }

        let mut policy = plan.strategy.create_policy(seed);
        let mut turns = Vec::new();
        let mut reloads = 0;
        let mut resume_mismatches = 0;
        let mut answers = 0;

        let result = loop {
            if turns.len() >= MAX_TURNS {
                bail!("session {session_key} did not finish within {MAX_TURNS} turns");
            }
            let outcome = session.advance(policy.as_mut()).await?;
            let answered = outcome.record.correct.is_some();
            log::debug!(
                "{session_key} Q{} {:?} -> {:?}",
                outcome.record.question_index + 1,
                outcome.record.decision,
                outcome.record.correct
            );
            turns.push(outcome.record);
            if let Some(result) = outcome.result {
                break result;
            }

            if answered {
                answers += 1;
            }
            if answered
                && let Some(every) = plan.reload_every
                && every > 0
                && answers % every == 0
            {
                reloads += 1;
                if !session.reload().await? {
                    resume_mismatches += 1;
                }
            }
        };

        let leftover_state = store.load_state(&session_key).await?.is_some();

        Ok(SimulationSummary {
            seed,
            session_key,
            strategy: plan.strategy,
            turns,
            result,
            questions_drawn,
            reloads,
            resume_mismatches,
            leftover_state,
            active_backend: store.active_backend().map(str::to_string),
        })
    }
}
