//! Tiered, debounced persistence of resumable sessions.
//!
//! Records live under `"<prefix><sessionKey>"` in an ordered list of storage
//! tiers. A tier that fails a save is abandoned for the rest of the store's
//! lifetime and the next tier takes over.
//!
//! Debounced writes are tracked per session key. Deleting a session cancels
//! its pending write and waits out one already in flight, so a stale state
//! never reappears after the delete.
pub mod backend;
pub mod debounce;
pub mod state;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    CURRENT_SCHEMA_VERSION, DEFAULT_DEBOUNCE_MS, DEFAULT_KEY_PREFIX, SESSION_KEY_PREFIX,
    SESSION_KEY_RANDOM_LEN,
};
use crate::questions::Question;
use crate::shuffle::RenderOrder;

pub use backend::{BackendError, FileBackend, MemoryBackend, StorageBackend};
pub use debounce::{Debouncer, KeyGuard};
pub use state::{SessionState, decode_record, validate_record};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage quota exceeded in {backend}; free up space and retry")]
    QuotaExceeded { backend: String },
    #[error("every storage tier failed: {}", .failures.join("; "))]
    AllTiersFailed { failures: Vec<String> },
    #[error("no storage backends configured")]
    NoBackends,
    #[error("debounced saves need a running tokio runtime")]
    NoRuntime,
    #[error("failed to encode session state: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistenceConfig {
    /// Namespace prepended to every session key.
    pub key_prefix: String,
    pub debounce_ms: u64,
    /// Minimum schema version accepted on load and the version new states carry.
    pub schema_version: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }
}

impl PersistenceConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub game_key: String,
    pub last_saved: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAvailability {
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAvailability {
    pub tiers: Vec<TierAvailability>,
    /// Diagnostic for the first tier that failed its probe.
    pub error: Option<String>,
}

impl StorageAvailability {
    #[must_use]
    pub fn any_available(&self) -> bool {
        self.tiers.iter().any(|tier| tier.available)
    }

    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        self.tiers
            .iter()
            .any(|tier| tier.name == name && tier.available)
    }
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let idx = usize::try_from(value % 36).unwrap_or(0);
        digits.push(char::from(BASE36_DIGITS[idx]));
        value /= 36;
    }
    digits.iter().rev().collect()
}

/// `G_<base36 millis>_<6 random base36 chars>`, unique with overwhelming probability.
pub fn generate_session_key_with_rng(rng: &mut impl Rng) -> String {
    let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
    let random: String = (0..SESSION_KEY_RANDOM_LEN)
        .map(|_| char::from(BASE36_DIGITS[rng.gen_range(0..BASE36_DIGITS.len())]))
        .collect();
    format!("{SESSION_KEY_PREFIX}{}_{random}", to_base36(millis))
}

#[must_use]
pub fn generate_session_key() -> String {
    generate_session_key_with_rng(&mut rand::thread_rng())
}

struct StoreInner {
    config: PersistenceConfig,
    backends: Vec<Arc<dyn StorageBackend>>,
    /// First tier still in use; only ever moves forward.
    active_tier: AtomicUsize,
}

impl StoreInner {
    fn record_key(&self, session_key: &str) -> String {
        format!("{}{session_key}", self.config.key_prefix)
    }

    fn active_tiers(&self) -> impl Iterator<Item = (usize, &Arc<dyn StorageBackend>)> {
        let start = self.active_tier.load(Ordering::SeqCst);
        self.backends.iter().enumerate().skip(start)
    }

    fn demote_to(&self, tier: usize) {
        let previous = self.active_tier.fetch_max(tier, Ordering::SeqCst);
        if tier > previous
            && let Some(backend) = self.backends.get(tier)
        {
            log::warn!("session storage now using fallback tier {}", backend.name());
        }
    }

    fn exhausted(&self, failures: Vec<String>) -> PersistenceError {
        if self.backends.is_empty() {
            PersistenceError::NoBackends
        } else {
            PersistenceError::AllTiersFailed { failures }
        }
    }

    async fn save(&self, state: &mut SessionState) -> Result<(), PersistenceError> {
        state.last_saved = chrono::Utc::now().timestamp_millis();
        let key = self.record_key(&state.game_key);
        let json = serde_json::to_string(state)?;
        let mut failures = Vec::new();
        for (tier, backend) in self.active_tiers() {
            match backend.put(&key, json.clone()).await {
                Ok(()) => {
                    self.demote_to(tier);
                    return Ok(());
                }
                Err(BackendError::QuotaExceeded { backend: name }) => {
                    log::error!("{name} quota exceeded. Cannot save game state.");
                    return Err(PersistenceError::QuotaExceeded { backend: name });
                }
                Err(err) => {
                    log::warn!("{} save failed, falling back: {err}", backend.name());
                    failures.push(err.to_string());
                }
            }
        }
        Err(self.exhausted(failures))
    }

    async fn fire(&self, mut state: SessionState) {
        if let Err(err) = self.save(&mut state).await {
            log::error!("Failed to save game state: {err}");
        }
    }
}

/// Session record store over an ordered list of storage tiers.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
    debouncer: Debouncer<String, SessionState>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("config", &self.inner.config)
            .field("tiers", &self.backend_names())
            .field("active_tier", &self.inner.active_tier.load(Ordering::SeqCst))
            .field("debouncer", &self.debouncer)
            .finish()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(config: PersistenceConfig, backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        let debouncer = Debouncer::new(config.debounce());
        Self {
            inner: Arc::new(StoreInner {
                config,
                backends,
                active_tier: AtomicUsize::new(0),
            }),
            debouncer,
        }
    }

    /// Store with default config over a single in-memory tier.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            PersistenceConfig::default(),
            vec![Arc::new(MemoryBackend::default())],
        )
    }

    #[must_use]
    pub fn config(&self) -> &PersistenceConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn backend_names(&self) -> Vec<&str> {
        self.inner.backends.iter().map(|b| b.name()).collect()
    }

    /// Name of the tier saves currently go to first.
    #[must_use]
    pub fn active_backend(&self) -> Option<&str> {
        self.inner
            .backends
            .get(self.inner.active_tier.load(Ordering::SeqCst))
            .map(|b| b.name())
    }

    #[must_use]
    pub fn generate_session_key(&self) -> String {
        generate_session_key()
    }

    #[must_use]
    pub fn create_initial_state(
        &self,
        session_key: &str,
        questions: Vec<Question>,
        render_order: Vec<RenderOrder>,
    ) -> SessionState {
        SessionState::initial(
            session_key,
            questions,
            render_order,
            self.inner.config.schema_version,
        )
    }

    /// Queue `state` for a debounced save, replacing any pending one for the
    /// same session. Other sessions keep their own pending saves.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::NoRuntime`] outside a tokio runtime.
    pub fn schedule_save(&self, state: SessionState) -> Result<(), PersistenceError> {
        let inner = Arc::clone(&self.inner);
        self.debouncer
            .schedule(state.game_key.clone(), state, move |state| async move {
                inner.fire(state).await;
            })
    }

    /// Whether any session has a debounced save waiting.
    #[must_use]
    pub fn has_pending_save(&self) -> bool {
        self.debouncer.has_any_pending()
    }

    #[must_use]
    pub fn has_pending_save_for(&self, session_key: &str) -> bool {
        self.debouncer.has_pending(&session_key.to_string())
    }

    /// Sessions the store is still tracking for debounced writes.
    #[must_use]
    pub fn tracked_sessions(&self) -> usize {
        self.debouncer.tracked_keys()
    }

    /// Write every pending debounced state now. Returns whether anything was written.
    ///
    /// # Errors
    ///
    /// Stops at the first failed save and propagates it; later sessions stay pending.
    pub async fn flush_pending(&self) -> Result<bool, PersistenceError> {
        let mut wrote = false;
        for session_key in self.debouncer.pending_keys() {
            let mut guard = self.debouncer.lock_key(&session_key).await;
            if let Some(mut state) = guard.take_pending() {
                self.inner.save(&mut state).await?;
                wrote = true;
            }
        }
        Ok(wrote)
    }

    /// Stamp `last_saved` and write through the first working tier.
    ///
    /// # Errors
    ///
    /// [`PersistenceError::QuotaExceeded`] as soon as a tier reports it,
    /// [`PersistenceError::AllTiersFailed`] when no tier accepts the write.
    pub async fn save_state(&self, state: &mut SessionState) -> Result<(), PersistenceError> {
        let _guard = self.debouncer.lock_key(&state.game_key).await;
        self.inner.save(state).await
    }

    /// Load and validate a record. Absent, stale and malformed records are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// [`PersistenceError::AllTiersFailed`] when no tier can be read.
    pub async fn load_state(
        &self,
        session_key: &str,
    ) -> Result<Option<SessionState>, PersistenceError> {
        let key = self.inner.record_key(session_key);
        let mut failures = Vec::new();
        for (_, backend) in self.inner.active_tiers() {
            match backend.get(&key).await {
                Ok(Some(json)) => {
                    return Ok(decode_record(&json, self.inner.config.schema_version));
                }
                Ok(None) => return Ok(None),
                Err(err) => {
                    log::warn!("{} load failed, trying next tier: {err}", backend.name());
                    failures.push(err.to_string());
                }
            }
        }
        Err(self.inner.exhausted(failures))
    }

    /// Remove a record from every active tier.
    ///
    /// A pending debounced save for the session is dropped, and one already
    /// writing finishes before the removal starts.
    ///
    /// # Errors
    ///
    /// [`PersistenceError::AllTiersFailed`] when no tier accepted the removal.
    pub async fn delete_state(&self, session_key: &str) -> Result<(), PersistenceError> {
        let mut guard = self.debouncer.lock_key(&session_key.to_string()).await;
        if guard.cancel() {
            log::debug!("dropped debounced save for deleted session {session_key}");
        }
        let key = self.inner.record_key(session_key);
        let mut failures = Vec::new();
        let mut removed = false;
        for (_, backend) in self.inner.active_tiers() {
            match backend.remove(&key).await {
                Ok(()) => removed = true,
                Err(err) => {
                    log::warn!("{} delete failed: {err}", backend.name());
                    failures.push(err.to_string());
                }
            }
        }
        if removed {
            Ok(())
        } else {
            Err(self.inner.exhausted(failures))
        }
    }

    /// Saved sessions, most recently saved first.
    ///
    /// # Errors
    ///
    /// [`PersistenceError::AllTiersFailed`] when no tier can be listed.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, PersistenceError> {
        let prefix = &self.inner.config.key_prefix;
        let mut failures = Vec::new();
        for (_, backend) in self.inner.active_tiers() {
            let keys = match backend.keys(prefix).await {
                Ok(keys) => keys,
                Err(err) => {
                    log::warn!("{} list failed, trying next tier: {err}", backend.name());
                    failures.push(err.to_string());
                    continue;
                }
            };
            let mut sessions = Vec::with_capacity(keys.len());
            for key in keys {
                let Ok(Some(json)) = backend.get(&key).await else {
                    continue;
                };
                if let Some(summary) = summarize(&json) {
                    sessions.push(summary);
                }
            }
            sessions.sort_by(|a, b| {
                b.last_saved
                    .cmp(&a.last_saved)
                    .then_with(|| a.game_key.cmp(&b.game_key))
            });
            return Ok(sessions);
        }
        Err(self.inner.exhausted(failures))
    }

    /// Probe every tier independently. Never fails.
    pub async fn check_storage_availability(&self) -> StorageAvailability {
        let mut availability = StorageAvailability::default();
        for backend in &self.inner.backends {
            let probe = backend.probe().await;
            if let Err(err) = &probe {
                log::warn!("storage tier {} unavailable: {err}", backend.name());
                if availability.error.is_none() {
                    availability.error = Some(format!("{} is not available", backend.name()));
                }
            }
            availability.tiers.push(TierAvailability {
                name: backend.name().to_string(),
                available: probe.is_ok(),
            });
        }
        availability
    }
}

fn summarize(json: &str) -> Option<SessionSummary> {
    let raw: Value = serde_json::from_str(json).ok()?;
    Some(SessionSummary {
        game_key: raw.get("gameKey")?.as_str()?.to_string(),
        last_saved: raw.get("lastSaved").and_then(Value::as_i64).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_295), "zz");
    }

    #[test]
    fn session_keys_have_expected_shape() {
        let mut rng = SmallRng::seed_from_u64(8);
        let key = generate_session_key_with_rng(&mut rng);
        let parts: Vec<&str> = key.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "G");
        assert_eq!(parts[2].len(), 6);
        assert!(
            parts[1..]
                .iter()
                .all(|p| p.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()))
        );
        assert_ne!(generate_session_key(), generate_session_key());
    }

    #[test]
    fn config_defaults_and_partial_json() {
        let config = PersistenceConfig::default();
        assert_eq!(config.key_prefix, "millionaire_game_");
        assert_eq!(config.debounce(), Duration::from_millis(500));
        let parsed: PersistenceConfig = serde_json::from_str(r#"{"debounceMs": 50}"#).unwrap();
        assert_eq!(parsed.debounce_ms, 50);
        assert_eq!(parsed.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn quota_error_is_actionable() {
        let err = PersistenceError::QuotaExceeded {
            backend: "local".into(),
        };
        assert!(err.to_string().contains("free up space"));
        let err = PersistenceError::AllTiersFailed {
            failures: vec!["a down".into(), "b down".into()],
        };
        assert_eq!(err.to_string(), "every storage tier failed: a down; b down");
    }

    #[tokio::test]
    async fn empty_store_reports_no_backends() {
        let store = SessionStore::new(PersistenceConfig::default(), Vec::new());
        assert!(matches!(
            store.load_state("G_x").await,
            Err(PersistenceError::NoBackends)
        ));
        let availability = store.check_storage_availability().await;
        assert!(!availability.any_available());
        assert!(store.active_backend().is_none());
    }

    #[tokio::test]
    async fn availability_flags_each_tier() {
        let primary = MemoryBackend::new("primary");
        let secondary = MemoryBackend::new("secondary");
        primary.set_failing(true);
        let store = SessionStore::new(
            PersistenceConfig::default(),
            vec![Arc::new(primary), Arc::new(secondary)],
        );
        let availability = store.check_storage_availability().await;
        assert!(!availability.is_available("primary"));
        assert!(availability.is_available("secondary"));
        assert_eq!(availability.error.as_deref(), Some("primary is not available"));
    }

    #[test]
    fn summarize_skips_records_without_key() {
        assert_eq!(summarize("{}"), None);
        assert_eq!(summarize("nope"), None);
        assert_eq!(
            summarize(r#"{"gameKey":"G_a","lastSaved":5}"#),
            Some(SessionSummary {
                game_key: "G_a".into(),
                last_saved: 5
            })
        );
    }
}
