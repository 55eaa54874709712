use anyhow::{Context, Result, bail};
use millionaire_game::{
    AnswerRecord, AudienceVote, EndReason, GameEngine, GameSessionResult, Lifeline,
    MemoryResultStore, PhoneFriendHint, PrizeLadder, QuestionSource, ResultCalculator,
    SessionState, SessionStore, ask_audience_with_rng, fifty_fifty_rendered,
    phone_a_friend_with_rng,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::logic::policy::{PlayerPolicy, TurnDecision, TurnView};

/// Per-question clock the controller stamps into the saved state.
pub const QUESTION_TIME_LIMIT_MS: i64 = 30_000;

/// Snapshot of one resolved turn.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub question_index: usize,
    pub question_id: u32,
    pub decision: TurnDecision,
    pub policy_name: String,
    /// Original option index clicked, for answer turns.
    pub chosen_option: Option<usize>,
    pub correct: Option<bool>,
}

/// Result of advancing the session by one decision.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub record: TurnRecord,
    /// Set once the decision ended the session.
    pub result: Option<GameSessionResult>,
}

/// Session controller driven by a [`PlayerPolicy`]. Every state change is
/// queued through the store's debounced save, the way a UI would.
pub struct SimulationSession {
    store: SessionStore,
    ladder: PrizeLadder,
    state: SessionState,
    lifeline_rng: ChaCha20Rng,
    audience: Option<Vec<AudienceVote>>,
    hint: Option<PhoneFriendHint>,
}

impl SimulationSession {
    /// Create a session under `session_key`, save it and stamp the first clock.
    ///
    /// # Errors
    ///
    /// Returns an error when the question bank cannot be loaded or the first
    /// save fails.
    pub async fn start<Q>(engine: &GameEngine<Q>, session_key: &str, seed: u64) -> Result<Self>
    where
        Q: QuestionSource,
    {
        let mut selection_rng = ChaCha20Rng::seed_from_u64(seed);
        let mut state = engine
            .create_session(session_key, &mut selection_rng)
            .context("failed to create session")?;
        if state.questions.is_empty() {
            bail!("question bank produced an empty session");
        }
        stamp_timer(&mut state);
        engine
            .store()
            .save_state(&mut state)
            .await
            .context("failed to save initial state")?;

        Ok(Self {
            store: engine.store().clone(),
            ladder: engine.ladder().clone(),
            state,
            lifeline_rng: ChaCha20Rng::seed_from_u64(seed.rotate_left(17)),
            audience: None,
            hint: None,
        })
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub const fn store(&self) -> &SessionStore {
        &self.store
    }

    /// What the player sees of the current question, if one is on screen.
    #[must_use]
    pub fn view(&self) -> Option<TurnView<'_>> {
        let question = self.state.current_question()?;
        Some(TurnView {
            question_index: self.state.current_question_index,
            question,
            order: self.state.current_render_order(),
            removed: &self.state.removed_options,
            audience: self.audience.as_deref(),
            hint: self.hint.as_ref(),
            lifelines: self.state.lifelines_used,
        })
    }

    /// Ask `policy` for a decision and apply it.
    ///
    /// # Errors
    ///
    /// Returns an error when no question is on screen or the session cannot be
    /// persisted.
    pub async fn advance(&mut self, policy: &mut dyn PlayerPolicy) -> Result<TurnOutcome> {
        let (decision, question_index, question_id) = {
            let Some(view) = self.view() else {
                bail!(
                    "no question on screen at index {}",
                    self.state.current_question_index
                );
            };
            (policy.decide(&view), view.question_index, view.question.id)
        };

        let mut record = TurnRecord {
            question_index,
            question_id,
            decision,
            policy_name: policy.name().to_string(),
            chosen_option: None,
            correct: None,
        };

        let result = match decision {
            TurnDecision::Answer(slot) => {
                let (chosen, correct, ended) = self.answer(slot)?;
                record.chosen_option = Some(chosen);
                record.correct = Some(correct);
                match ended {
                    Some(reason) => Some(self.finish(reason).await?),
                    None => None,
                }
            }
            TurnDecision::UseLifeline(lifeline) => {
                self.use_lifeline(lifeline)?;
                None
            }
            TurnDecision::WalkAway => Some(self.finish(EndReason::WalkAway).await?),
            TurnDecision::TimeOut => Some(self.finish(EndReason::Timeout).await?),
        };

        Ok(TurnOutcome { record, result })
    }

    /// Click a rendered slot. Returns the original index chosen, whether it was
    /// right and the end reason if the click ended the session.
    fn answer(&mut self, rendered_slot: usize) -> Result<(usize, bool, Option<EndReason>)> {
        let order = self.state.current_render_order();
        let Some(chosen) = order.original_index(rendered_slot) else {
            bail!("rendered slot {rendered_slot} is off the board");
        };
        let Some(question) = self.state.current_question() else {
            bail!("no question to answer");
        };
        let record = AnswerRecord::new(question, chosen);
        self.state.answered_questions.push(record);

        if !record.correct {
            self.save()?;
            return Ok((chosen, false, Some(EndReason::Wrong)));
        }

        self.state.current_question_index += 1;
        self.state.clear_question_aids();
        self.audience = None;
        self.hint = None;
        if self.state.current_question_index >= self.state.total_questions() {
            self.save()?;
            return Ok((chosen, true, Some(EndReason::Win)));
        }
        stamp_timer(&mut self.state);
        self.save()?;
        Ok((chosen, true, None))
    }

    /// Spend a lifeline on the current question. Returns `false` when it was
    /// already spent.
    fn use_lifeline(&mut self, lifeline: Lifeline) -> Result<bool> {
        if !self.state.lifelines_used.mark_used(lifeline) {
            log::debug!("{lifeline} already used in {}", self.state.game_key);
            return Ok(false);
        }
        let order = self.state.current_render_order();
        let Some(question) = self.state.current_question().cloned() else {
            bail!("no question for {lifeline}");
        };
        match lifeline {
            Lifeline::FiftyFifty => {
                self.state.removed_options =
                    fifty_fifty_rendered(&question, &order, &mut self.lifeline_rng);
            }
            Lifeline::AskAudience => {
                self.audience = Some(ask_audience_with_rng(&question, &mut self.lifeline_rng));
                self.state.audience_votes_active = true;
            }
            Lifeline::PhoneFriend => {
                self.hint = Some(phone_a_friend_with_rng(&question, &mut self.lifeline_rng));
                self.state.phone_friend_active = true;
            }
        }
        self.save()?;
        Ok(true)
    }

    fn save(&self) -> Result<()> {
        self.store
            .schedule_save(self.state.clone())
            .context("failed to schedule save")
    }

    /// Simulate a page reload: flush the pending save and resume from storage.
    ///
    /// Returns whether the resumed state matched the in-memory one. Lifeline
    /// overlays that live outside the saved state are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error when the saved state cannot be read back.
    pub async fn reload(&mut self) -> Result<bool> {
        self.store.flush_pending().await?;
        let Some(mut resumed) = self.store.load_state(&self.state.game_key).await? else {
            bail!("saved session {} vanished", self.state.game_key);
        };
        let saved_at = resumed.last_saved;
        resumed.last_saved = self.state.last_saved;
        let matched = resumed == self.state;
        resumed.last_saved = saved_at;

        self.state = resumed;
        self.audience = None;
        self.hint = None;
        Ok(matched)
    }

    /// Package the result and drop the saved session.
    async fn finish(&mut self, reason: EndReason) -> Result<GameSessionResult> {
        self.store.flush_pending().await?;
        let answered = self.state.answered_for_result(&self.ladder);
        let mut calculator = ResultCalculator::new(self.ladder.clone(), MemoryResultStore::new());
        let result = calculator.create_session_result(
            reason,
            self.state.current_question_index,
            answered,
            self.state.lifelines_used,
            self.state.total_questions(),
        );
        self.store
            .delete_state(&self.state.game_key)
            .await
            .context("failed to clear finished session")?;
        Ok(result)
    }
}

fn stamp_timer(state: &mut SessionState) {
    state.timer_start_time = Some(chrono::Utc::now().timestamp_millis());
    state.timer_duration = Some(QUESTION_TIME_LIMIT_MS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::policy::PlayStrategy;
    use millionaire_game::{Difficulty, Question};

    fn bank() -> Vec<Question> {
        (1..=15)
            .map(|id| Question {
                id,
                text: format!("Question {id}"),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: usize::try_from(id % 4).unwrap(),
                difficulty: Difficulty::ALL[usize::try_from((id - 1) / 3).unwrap()],
            })
            .collect()
    }

    fn engine() -> GameEngine<Vec<Question>> {
        GameEngine::new(bank(), PrizeLadder::default(), SessionStore::in_memory())
    }

    #[tokio::test]
    async fn perfect_policy_wins_and_clears_storage() {
        let engine = engine();
        let mut session = SimulationSession::start(&engine, "G_sim_win", 3).await.unwrap();
        let mut policy = PlayStrategy::Perfect.create_policy(3);
        let result = loop {
            let outcome = session.advance(policy.as_mut()).await.unwrap();
            if let Some(result) = outcome.result {
                break result;
            }
        };
        assert_eq!(result.end_reason, EndReason::Win);
        assert_eq!(result.final_prize, "$1,000,000");
        assert!(engine.store().load_state("G_sim_win").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fifty_fifty_hides_two_wrong_slots() {
        let engine = engine();
        let mut session = SimulationSession::start(&engine, "G_sim_5050", 8).await.unwrap();
        assert!(session.use_lifeline(Lifeline::FiftyFifty).unwrap());
        assert!(!session.use_lifeline(Lifeline::FiftyFifty).unwrap());
        let view = session.view().unwrap();
        assert_eq!(view.removed.len(), 2);
        assert!(!view.removed.contains(&view.correct_slot()));
    }

    #[tokio::test]
    async fn reload_resumes_the_same_state() {
        let engine = engine();
        let mut session = SimulationSession::start(&engine, "G_sim_reload", 1).await.unwrap();
        let mut policy = PlayStrategy::Perfect.create_policy(1);
        for _ in 0..4 {
            session.advance(policy.as_mut()).await.unwrap();
        }
        assert!(session.reload().await.unwrap());
        assert_eq!(session.state().current_question_index, 4);
        assert_eq!(session.state().answered_questions.len(), 4);
    }
}
