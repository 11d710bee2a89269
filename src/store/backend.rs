//! Persistence seam for the record store.
//!
//! The store only needs string keys and string values. Two real backends
//! implement [`KeyValueBackend`]: the file-based preference store (primary)
//! and the SQLite record table (fallback). [`FailoverBackend`] combines them
//! the way the store expects: primary first, fallback when the primary errors.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::BackendError;

/// String key/value persistence used by [`super::RecordStore`].
#[async_trait]
pub trait KeyValueBackend: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Reads a value; `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), BackendError>;

    /// Lists stored keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, BackendError>;
}

/// In-process backend with call counters.
///
/// Used for tests (the counters act as a write spy) and `--in-memory` runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    set_calls: AtomicUsize,
    remove_calls: AtomicUsize,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls made so far.
    #[must_use]
    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    /// Number of `remove` calls made so far.
    #[must_use]
    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Primary backend with a fallback used whenever the primary errors.
///
/// Reads that succeed on the primary (including "absent") never consult the
/// fallback. Removal is attempted on both and never fails.
#[derive(Debug, Clone)]
pub struct FailoverBackend {
    primary: Arc<dyn KeyValueBackend>,
    fallback: Arc<dyn KeyValueBackend>,
}

impl FailoverBackend {
    /// Combines a primary and a fallback backend.
    #[must_use]
    pub fn new(primary: Arc<dyn KeyValueBackend>, fallback: Arc<dyn KeyValueBackend>) -> Self {
        Self { primary, fallback }
    }

    fn log_failover(&self, operation: &'static str, key: &str, error: &BackendError) {
        warn!(
            operation,
            key,
            primary = self.primary.name(),
            fallback = self.fallback.name(),
            error = %error,
            "primary storage failed, using fallback"
        );
    }
}

#[async_trait]
impl KeyValueBackend for FailoverBackend {
    fn name(&self) -> &'static str {
        "failover"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        match self.primary.get(key).await {
            Ok(value) => Ok(value),
            Err(error) => {
                self.log_failover("get", key, &error);
                self.fallback.get(key).await
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        match self.primary.set(key, value).await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.log_failover("set", key, &error);
                self.fallback.set(key, value).await
            }
        }
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        if let Err(error) = self.primary.remove(key).await {
            debug!(key, error = %error, "primary remove failed");
        }
        if let Err(error) = self.fallback.remove(key).await {
            debug!(key, error = %error, "fallback remove failed");
        }
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        match self.primary.keys_with_prefix(prefix).await {
            Ok(keys) => Ok(keys),
            Err(error) => {
                self.log_failover("keys_with_prefix", prefix, &error);
                self.fallback.keys_with_prefix(prefix).await
            }
        }
    }
}
