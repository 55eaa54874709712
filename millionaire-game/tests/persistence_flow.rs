use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use millionaire_game::persistence::decode_record;
use millionaire_game::{
    BackendError, Difficulty, FileBackend, MemoryBackend, PersistenceConfig, PersistenceError,
    Question, SessionState, SessionStore, StorageBackend, build_render_orders,
    generate_session_key,
};
use regex::Regex;

const PREFIX: &str = "millionaire_game_";

fn questions() -> Vec<Question> {
    (1..=15)
        .map(|id| Question {
            id,
            text: format!("Question {id}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: 1,
            difficulty: Difficulty::Hard,
        })
        .collect()
}

fn store_over(backends: Vec<MemoryBackend>) -> SessionStore {
    let tiers: Vec<Arc<dyn StorageBackend>> = backends
        .into_iter()
        .map(|backend| Arc::new(backend) as Arc<dyn StorageBackend>)
        .collect();
    SessionStore::new(PersistenceConfig::default(), tiers)
}

/// Memory tier whose writes take a while to land.
struct SlowBackend {
    inner: MemoryBackend,
    put_delay: Duration,
}

#[async_trait]
impl StorageBackend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }

    async fn put(&self, key: &str, value: String) -> Result<(), BackendError> {
        tokio::time::sleep(self.put_delay).await;
        self.inner.put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.inner.remove(key).await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        self.inner.keys(prefix).await
    }
}

fn fresh_state(store: &SessionStore, key: &str) -> SessionState {
    let questions = questions();
    let orders = build_render_orders(key, &questions);
    store.create_initial_state(key, questions, orders)
}

fn stored_index(backend: &MemoryBackend, key: &str) -> Option<usize> {
    let json = backend.raw_get(&format!("{PREFIX}{key}"))?;
    decode_record(&json, 1).map(|state| state.current_question_index)
}

#[tokio::test]
async fn save_then_load_round_trips_every_field() {
    let store = SessionStore::in_memory();
    let mut state = fresh_state(&store, "G_roundtrip");
    state.current_question_index = 6;
    state.lifelines_used.phone_friend = true;
    state.removed_options = vec![0, 2];
    state.timer_start_time = Some(1_700_000_000_000);
    state.timer_duration = Some(30_000);
    state.sound_enabled = false;
    store.save_state(&mut state).await.unwrap();
    let loaded = store.load_state("G_roundtrip").await.unwrap();
    assert_eq!(loaded, Some(state));
}

#[tokio::test]
async fn save_stamps_last_saved() {
    let store = SessionStore::in_memory();
    let mut state = fresh_state(&store, "G_stamp");
    state.last_saved = 0;
    store.save_state(&mut state).await.unwrap();
    assert!(state.last_saved > 0);
}

#[tokio::test]
async fn delete_then_load_is_not_found() {
    let store = SessionStore::in_memory();
    let mut state = fresh_state(&store, "G_delete");
    store.save_state(&mut state).await.unwrap();
    store.delete_state("G_delete").await.unwrap();
    assert_eq!(store.load_state("G_delete").await.unwrap(), None);
    assert_eq!(store.load_state("G_never_saved").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn rapid_schedules_collapse_to_the_last_state() {
    let backend = MemoryBackend::new("primary");
    let store = store_over(vec![backend.clone()]);
    let mut state = fresh_state(&store, "G_burst");
    for index in 1..=3 {
        state.current_question_index = index;
        store.schedule_save(state.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(backend.write_count(), 0);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(backend.write_count(), 1);
    assert_eq!(stored_index(&backend, "G_burst"), Some(3));
    assert!(!store.has_pending_save());
}

#[tokio::test(start_paused = true)]
async fn flush_pending_writes_immediately() {
    let backend = MemoryBackend::new("primary");
    let store = store_over(vec![backend.clone()]);
    let mut state = fresh_state(&store, "G_flush");
    state.current_question_index = 9;
    store.schedule_save(state).unwrap();
    assert!(store.flush_pending().await.unwrap());
    assert_eq!(stored_index(&backend, "G_flush"), Some(9));
    assert!(!store.flush_pending().await.unwrap());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_debounced_save_after_delete_is_dropped() {
    let backend = MemoryBackend::new("primary");
    let store = store_over(vec![backend.clone()]);
    let mut state = fresh_state(&store, "G_late");
    store.save_state(&mut state).await.unwrap();

    state.current_question_index = 4;
    store.schedule_save(state.clone()).unwrap();
    store.delete_state("G_late").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.load_state("G_late").await.unwrap(), None);

    // A direct save after the delete is a deliberate new write.
    store.save_state(&mut state).await.unwrap();
    assert_eq!(stored_index(&backend, "G_late"), Some(4));
}

#[tokio::test(start_paused = true)]
async fn pending_saves_are_kept_per_session() {
    let backend = MemoryBackend::new("primary");
    let store = store_over(vec![backend.clone()]);
    let mut first = fresh_state(&store, "G_first");
    first.current_question_index = 2;
    let mut second = fresh_state(&store, "G_second");
    second.current_question_index = 5;

    store.schedule_save(first.clone()).unwrap();
    store.schedule_save(second).unwrap();
    first.current_question_index = 3;
    store.schedule_save(first).unwrap();
    assert!(store.has_pending_save_for("G_first"));
    assert!(store.has_pending_save_for("G_second"));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(stored_index(&backend, "G_first"), Some(3));
    assert_eq!(stored_index(&backend, "G_second"), Some(5));
    assert_eq!(backend.write_count(), 2);
    assert_eq!(store.tracked_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn flush_writes_every_pending_session() {
    let backend = MemoryBackend::new("primary");
    let store = store_over(vec![backend.clone()]);
    for key in ["G_left", "G_right"] {
        store.schedule_save(fresh_state(&store, key)).unwrap();
    }
    assert!(store.flush_pending().await.unwrap());
    assert_eq!(stored_index(&backend, "G_left"), Some(0));
    assert_eq!(stored_index(&backend, "G_right"), Some(0));
    assert!(!store.has_pending_save());
}

#[tokio::test(start_paused = true)]
async fn delete_waits_out_a_debounced_write_in_flight() {
    let memory = MemoryBackend::new("memory");
    let slow = SlowBackend {
        inner: memory.clone(),
        put_delay: Duration::from_millis(100),
    };
    let store = SessionStore::new(PersistenceConfig::default(), vec![Arc::new(slow)]);
    let state = fresh_state(&store, "G_in_flight");
    store.schedule_save(state).unwrap();

    // The timer has fired and the write is still sleeping inside `put`.
    tokio::time::sleep(Duration::from_millis(550)).await;
    assert!(!store.has_pending_save());
    assert_eq!(memory.write_count(), 0);

    store.delete_state("G_in_flight").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(memory.write_count(), 1);
    assert_eq!(store.load_state("G_in_flight").await.unwrap(), None);
    assert_eq!(store.tracked_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn finished_sessions_leave_no_bookkeeping_behind() {
    let store = SessionStore::in_memory();
    for n in 0..20 {
        let key = format!("G_churn_{n}");
        let mut state = fresh_state(&store, &key);
        store.save_state(&mut state).await.unwrap();
        store.schedule_save(state).unwrap();
        store.delete_state(&key).await.unwrap();
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.tracked_sessions(), 0);
    assert!(store.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_schema_records_are_not_found() {
    let backend = MemoryBackend::new("primary");
    let store = store_over(vec![backend.clone()]);
    let mut state = fresh_state(&store, "G_stale");
    state.schema_version = 0;
    backend.raw_put(
        format!("{PREFIX}G_stale"),
        serde_json::to_string(&state).unwrap(),
    );
    assert!(backend.raw_get(&format!("{PREFIX}G_stale")).is_some());
    assert_eq!(store.load_state("G_stale").await.unwrap(), None);
}

#[tokio::test]
async fn records_missing_required_fields_are_not_found() {
    let backend = MemoryBackend::new("primary");
    let store = store_over(vec![backend.clone()]);
    backend.raw_put(
        format!("{PREFIX}G_partial"),
        r#"{"schemaVersion":1,"gameKey":"G_partial","questions":[]}"#,
    );
    assert_eq!(store.load_state("G_partial").await.unwrap(), None);
}

#[tokio::test]
async fn failing_primary_falls_back_and_stays_there() {
    let primary = MemoryBackend::new("primary");
    let secondary = MemoryBackend::new("secondary");
    let store = store_over(vec![primary.clone(), secondary.clone()]);
    primary.set_failing(true);

    let mut state = fresh_state(&store, "G_fallback");
    store.save_state(&mut state).await.unwrap();
    assert_eq!(secondary.write_count(), 1);
    assert_eq!(store.active_backend(), Some("secondary"));

    primary.set_failing(false);
    let loaded = store.load_state("G_fallback").await.unwrap();
    assert_eq!(loaded, Some(state.clone()));
    store.save_state(&mut state).await.unwrap();
    assert_eq!(primary.write_count(), 0);
    assert_eq!(secondary.write_count(), 2);
}

#[tokio::test]
async fn exhausting_every_tier_is_reported() {
    let primary = MemoryBackend::new("primary");
    let secondary = MemoryBackend::new("secondary");
    primary.set_failing(true);
    secondary.set_failing(true);
    let store = store_over(vec![primary, secondary]);
    let mut state = fresh_state(&store, "G_down");
    let err = store.save_state(&mut state).await.unwrap_err();
    match err {
        PersistenceError::AllTiersFailed { failures } => assert_eq!(failures.len(), 2),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(matches!(
        store.load_state("G_down").await,
        Err(PersistenceError::AllTiersFailed { .. })
    ));
    assert!(store.delete_state("G_down").await.is_err());
    assert!(store.list_sessions().await.is_err());
}

#[tokio::test]
async fn quota_exceeded_is_surfaced_without_fallback() {
    let primary = MemoryBackend::with_capacity("primary", 64);
    let secondary = MemoryBackend::new("secondary");
    let store = store_over(vec![primary, secondary.clone()]);
    let mut state = fresh_state(&store, "G_quota");
    let err = store.save_state(&mut state).await.unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::QuotaExceeded { ref backend } if backend == "primary"
    ));
    assert_eq!(secondary.write_count(), 0);
}

#[tokio::test]
async fn list_sessions_reports_saved_keys_newest_first() {
    let backend = MemoryBackend::new("primary");
    let store = store_over(vec![backend.clone()]);
    for key in ["G_one", "G_two"] {
        let mut state = fresh_state(&store, key);
        store.save_state(&mut state).await.unwrap();
    }
    backend.raw_put("unrelated_key", "{}");
    backend.raw_put(format!("{PREFIX}G_garbage"), "not json");

    let mut old = fresh_state(&store, "G_old");
    old.last_saved = 1;
    backend.raw_put(format!("{PREFIX}G_old"), serde_json::to_string(&old).unwrap());

    let sessions = store.list_sessions().await.unwrap();
    let keys: Vec<&str> = sessions.iter().map(|s| s.game_key.as_str()).collect();
    assert_eq!(keys.len(), 3);
    assert_eq!(keys.last(), Some(&"G_old"));
    assert!(keys.contains(&"G_one") && keys.contains(&"G_two"));
}

#[tokio::test]
async fn file_tier_persists_across_store_instances() {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let dir = std::env::temp_dir().join(format!("millionaire-flow-{}-{nanos}", std::process::id()));
    let tiers = || -> Vec<Arc<dyn StorageBackend>> { vec![Arc::new(FileBackend::new(&dir))] };

    let first = SessionStore::new(PersistenceConfig::default(), tiers());
    let mut state = fresh_state(&first, "G_disk");
    state.current_question_index = 11;
    first.save_state(&mut state).await.unwrap();
    assert!(dir.join(format!("{PREFIX}G_disk.json")).exists());

    let second = SessionStore::new(PersistenceConfig::default(), tiers());
    assert_eq!(second.load_state("G_disk").await.unwrap(), Some(state));
    let listed = second.list_sessions().await.unwrap();
    assert_eq!(listed.len(), 1);
    second.delete_state("G_disk").await.unwrap();
    assert!(second.load_state("G_disk").await.unwrap().is_none());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn custom_prefix_namespaces_records() {
    let backend = MemoryBackend::new("primary");
    let config = PersistenceConfig {
        key_prefix: "trivia_".into(),
        ..PersistenceConfig::default()
    };
    let store = SessionStore::new(config, vec![Arc::new(backend.clone())]);
    let mut state = fresh_state(&store, "G_prefixed");
    store.save_state(&mut state).await.unwrap();
    assert!(backend.raw_get("trivia_G_prefixed").is_some());
}

#[test]
fn generated_keys_match_documented_shape() {
    let pattern = Regex::new(r"^G_[0-9a-z]+_[0-9a-z]{6}$").unwrap();
    for _ in 0..50 {
        let key = generate_session_key();
        assert!(pattern.is_match(&key), "{key}");
    }
}

#[test]
fn scheduling_without_a_runtime_fails_cleanly() {
    let store = SessionStore::in_memory();
    let state = fresh_state(&store, "G_no_runtime");
    assert!(matches!(
        store.schedule_save(state),
        Err(PersistenceError::NoRuntime)
    ));
}
