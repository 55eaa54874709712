//! Centralized tuning constants for the trivia game logic.
//!
//! Shuffle constants and lifeline odds are part of the reproducibility
//! contract with previously persisted sessions: changing any of them
//! reshuffles resumed games.

// Logging keys -------------------------------------------------------------
pub(crate) const DEBUG_ENV_VAR: &str = "MILLIONAIRE_DEBUG_LOGS";

// Seeded generator ---------------------------------------------------------
pub(crate) const LCG_MULTIPLIER: u64 = 1_664_525;
pub(crate) const LCG_INCREMENT: u64 = 1_013_904_223;
pub(crate) const LCG_MODULUS: u64 = 1 << 32;

// Prize ladder -------------------------------------------------------------
/// Returned for every lookup that does not resolve to a ladder level.
pub const NO_PRIZE: &str = "$0";
pub(crate) const DEFAULT_LADDER: [(u32, &str, bool); 15] = [
    (1, "$100", false),
    (2, "$200", false),
    (3, "$300", false),
    (4, "$500", false),
    (5, "$1,000", true),
    (6, "$2,000", false),
    (7, "$4,000", false),
    (8, "$8,000", false),
    (9, "$16,000", false),
    (10, "$32,000", true),
    (11, "$64,000", false),
    (12, "$125,000", false),
    (13, "$250,000", false),
    (14, "$500,000", false),
    (15, "$1,000,000", false),
];

// Lifelines ----------------------------------------------------------------
pub(crate) const FIFTY_FIFTY_REMOVALS: usize = 2;
pub(crate) const AUDIENCE_CORRECT_MIN: f64 = 45.0;
pub(crate) const AUDIENCE_CORRECT_SPAN: f64 = 35.0;
pub(crate) const AUDIENCE_TOTAL: i32 = 100;
pub(crate) const PHONE_FRIEND_ACCURACY: f64 = 0.8;
pub(crate) const PHONE_CONFIDENCE_HIGH_CUTOFF: f64 = 0.3;
pub(crate) const PHONE_CONFIDENCE_MID_CUTOFF: f64 = 0.7;
pub const PHONE_CONFIDENCE_HIGH: &str = "I'm pretty sure it's";
pub const PHONE_CONFIDENCE_MID: &str = "I think it's";
pub const PHONE_CONFIDENCE_LOW: &str = "I believe it's";
pub const PHONE_CONFIDENCE_UNSURE: &str = "I'm not certain, but maybe";

// Question bank ------------------------------------------------------------
pub(crate) const CSV_MIN_COLUMNS: usize = 8;
pub(crate) const QUESTIONS_PER_TIER: usize = 3;

// Persistence --------------------------------------------------------------
/// Schema version written by this build; older records are rejected on load.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;
pub(crate) const DEFAULT_KEY_PREFIX: &str = "millionaire_game_";
pub(crate) const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub(crate) const SESSION_KEY_PREFIX: &str = "G_";
pub(crate) const SESSION_KEY_RANDOM_LEN: usize = 6;
pub(crate) const STORAGE_PROBE_KEY: &str = "test_storage";
/// Fields a persisted record must carry before it is decoded.
pub(crate) const REQUIRED_STATE_FIELDS: [&str; 6] = [
    "schemaVersion",
    "gameKey",
    "currentQuestionIndex",
    "questions",
    "lifelinesUsed",
    "answeredQuestions",
];
