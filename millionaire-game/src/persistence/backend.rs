//! Storage tiers the session store writes through.
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::constants::STORAGE_PROBE_KEY;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("{backend} is unavailable: {reason}")]
    Unavailable { backend: String, reason: String },
    #[error("{backend} storage quota exceeded")]
    QuotaExceeded { backend: String },
    #[error("{backend} I/O failure: {reason}")]
    Io { backend: String, reason: String },
}

/// A key/value tier holding serialized session records.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn put(&self, key: &str, value: String) -> Result<(), BackendError>;

    /// `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), BackendError>;

    /// Every stored key starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, BackendError>;

    /// Write and remove a throwaway entry to check the tier is usable.
    async fn probe(&self) -> Result<(), BackendError> {
        self.put(STORAGE_PROBE_KEY, "test".to_string()).await?;
        self.remove(STORAGE_PROBE_KEY).await
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: Mutex<BTreeMap<String, String>>,
    failing: AtomicBool,
    writes: AtomicUsize,
}

/// In-process tier. Clones share the same entries.
///
/// Failure and quota injection make it the workhorse for fallback tests.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: String,
    capacity_bytes: Option<usize>,
    inner: Arc<MemoryInner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity_bytes: None,
            inner: Arc::default(),
        }
    }

    /// A tier that rejects writes once stored values would exceed `capacity_bytes`.
    #[must_use]
    pub fn with_capacity(name: impl Into<String>, capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes: Some(capacity_bytes),
            ..Self::new(name)
        }
    }

    /// Make every operation fail with [`BackendError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful `put` calls so far, excluding availability probes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Read an entry directly, bypassing failure injection.
    #[must_use]
    pub fn raw_get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    /// Write an entry directly, bypassing failure injection and quota.
    pub fn raw_put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries().insert(key.into(), value.into());
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable {
                backend: self.name.clone(),
                reason: "backend disabled".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, value: String) -> Result<(), BackendError> {
        self.check()?;
        let mut entries = self.entries();
        if let Some(capacity) = self.capacity_bytes {
            let used: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum();
            if used + key.len() + value.len() > capacity {
                return Err(BackendError::QuotaExceeded {
                    backend: self.name.clone(),
                });
            }
        }
        entries.insert(key.to_string(), value);
        if key != STORAGE_PROBE_KEY {
            self.inner.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.check()?;
        Ok(self.entries().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.check()?;
        self.entries().remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        self.check()?;
        Ok(self
            .entries()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

const RECORD_EXTENSION: &str = ".json";

/// One JSON file per record inside a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    name: String,
    dir: PathBuf,
}

impl FileBackend {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            name: format!("file:{}", dir.display()),
            dir,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> Result<PathBuf, BackendError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(BackendError::Io {
                backend: self.name.clone(),
                reason: format!("invalid record key {key:?}"),
            });
        }
        Ok(self.dir.join(format!("{key}{RECORD_EXTENSION}")))
    }

    fn map_io(&self, err: &std::io::Error) -> BackendError {
        match err.kind() {
            ErrorKind::StorageFull => BackendError::QuotaExceeded {
                backend: self.name.clone(),
            },
            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => {
                BackendError::Unavailable {
                    backend: self.name.clone(),
                    reason: err.to_string(),
                }
            }
            _ => BackendError::Io {
                backend: self.name.clone(),
                reason: err.to_string(),
            },
        }
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, value: String) -> Result<(), BackendError> {
        let path = self.record_path(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| self.map_io(&err))?;
        tokio::fs::write(&path, value)
            .await
            .map_err(|err| self.map_io(&err))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let path = self.record_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.map_io(&err)),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        let path = self.record_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.map_io(&err)),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.map_io(&err)),
        };
        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|err| self.map_io(&err))? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(key) = name.strip_suffix(RECORD_EXTENSION)
                && key.starts_with(prefix)
            {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
