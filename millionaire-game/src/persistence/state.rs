//! Versioned session record and its load-time schema guard.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::REQUIRED_STATE_FIELDS;
use crate::ladder::PrizeLadder;
use crate::lifelines::LifelineState;
use crate::questions::Question;
use crate::result::{AnswerRecord, AnsweredQuestion};
use crate::shuffle::RenderOrder;

const fn default_sound_enabled() -> bool {
    true
}

/// Everything needed to resume a session after a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub schema_version: u32,
    /// Session key; also the shuffle seed input.
    pub game_key: String,
    pub current_question_index: usize,
    #[serde(default)]
    pub selected_question_ids: Vec<u32>,
    pub questions: Vec<Question>,
    pub lifelines_used: LifelineState,
    /// Rendered positions hidden by 50:50 on the current question.
    #[serde(default)]
    pub removed_options: Vec<usize>,
    #[serde(default)]
    pub audience_votes_active: bool,
    #[serde(default)]
    pub phone_friend_active: bool,
    pub answered_questions: Vec<AnswerRecord>,
    /// One entry per question, parallel to `questions`.
    #[serde(default)]
    pub render_order: Vec<RenderOrder>,
    #[serde(default)]
    pub timer_start_time: Option<i64>,
    #[serde(default)]
    pub timer_duration: Option<i64>,
    #[serde(default = "default_sound_enabled")]
    pub sound_enabled: bool,
    /// Milliseconds since the Unix epoch of the last successful save.
    #[serde(default)]
    pub last_saved: i64,
}

impl SessionState {
    /// Fresh state at question 0 with no lifelines spent.
    #[must_use]
    pub fn initial(
        game_key: impl Into<String>,
        questions: Vec<Question>,
        render_order: Vec<RenderOrder>,
        schema_version: u32,
    ) -> Self {
        Self {
            schema_version,
            game_key: game_key.into(),
            current_question_index: 0,
            selected_question_ids: questions.iter().map(|q| q.id).collect(),
            questions,
            lifelines_used: LifelineState::default(),
            removed_options: Vec::new(),
            audience_votes_active: false,
            phone_friend_active: false,
            answered_questions: Vec::new(),
            render_order,
            timer_start_time: None,
            timer_duration: None,
            sound_enabled: true,
            last_saved: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question_index)
    }

    #[must_use]
    pub fn current_render_order(&self) -> RenderOrder {
        self.render_order
            .get(self.current_question_index)
            .copied()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.answered_questions.iter().filter(|a| a.correct).count()
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    /// Reset the per-question lifeline overlays before moving on.
    pub fn clear_question_aids(&mut self) {
        self.removed_options.clear();
        self.audience_votes_active = false;
        self.phone_friend_active = false;
    }

    /// Answer log expanded with question details and the prize of each rung.
    #[must_use]
    pub fn answered_for_result(&self, ladder: &PrizeLadder) -> Vec<AnsweredQuestion> {
        self.answered_questions
            .iter()
            .enumerate()
            .filter_map(|(position, record)| {
                let question = self.questions.iter().find(|q| q.id == record.question_id)?;
                let number = u32::try_from(position + 1).unwrap_or(u32::MAX);
                Some(AnsweredQuestion::from_record(
                    record,
                    question,
                    ladder.prize_for_question(number),
                ))
            })
            .collect()
    }
}

/// Schema guard: an object carrying every required field with a schema
/// version at or above `current_version`.
#[must_use]
pub fn validate_record(raw: &Value, current_version: u32) -> bool {
    let Some(object) = raw.as_object() else {
        return false;
    };
    if let Some(missing) = REQUIRED_STATE_FIELDS
        .iter()
        .find(|field| !object.contains_key(**field))
    {
        log::warn!("rejecting saved session: missing field {missing}");
        return false;
    }
    let version = object.get("schemaVersion").and_then(Value::as_u64);
    match version {
        Some(version) if version >= u64::from(current_version) => true,
        other => {
            log::warn!(
                "rejecting saved session: schema version {other:?} below {current_version}"
            );
            false
        }
    }
}

/// Parse, guard and decode a stored record. Anything unusable becomes `None`.
#[must_use]
pub fn decode_record(json: &str, current_version: u32) -> Option<SessionState> {
    let raw: Value = serde_json::from_str(json)
        .map_err(|err| log::warn!("saved session is not valid JSON: {err}"))
        .ok()?;
    if !validate_record(&raw, current_version) {
        return None;
    }
    serde_json::from_value(raw)
        .map_err(|err| log::warn!("saved session failed to decode: {err}"))
        .ok()
}
