//! Record store: durable record bodies plus a separate status index.
//!
//! # Overview
//!
//! - [`RecordStore`] - write/read/update/remove operations over stored records
//! - [`KeyValueBackend`] - persistence seam, with [`PreferencesBackend`] (primary),
//!   [`SqliteBackend`] (fallback), [`FailoverBackend`] and [`MemoryBackend`]
//! - [`StoreError`] / [`BackendError`] - operation error types
//!
//! Every mutation follows the same order: bodies first, then one index
//! flush. A reader that finds an index entry without a body (or a body that
//! does not parse) skips it and logs; nothing is repaired implicitly.
//! [`RecordStore::rebuild_index`] is the explicit repair path.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use registros_core::store::{MemoryBackend, RecordStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RecordStore::new(Arc::new(MemoryBackend::new()));
//! let pending = store.read_pending().await?;
//! println!("{} pending", pending.len());
//! # Ok(())
//! # }
//! ```

mod backend;
mod error;
mod index;
mod keys;
mod preferences;
mod sqlite;

pub use backend::{FailoverBackend, KeyValueBackend, MemoryBackend};
pub use error::{BackendError, DbErrorKind, StoreError};
pub use index::{Index, IndexEntry};
pub use keys::{INDEX_KEY, ITEM_KEY_PREFIX, item_key};
pub use preferences::PreferencesBackend;
pub use sqlite::SqliteBackend;

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::record::{Record, RecordStatus, StoredRecord};
use index::{parse_index, serialize_index, uids_with_status};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of a batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Records newly persisted.
    pub added: usize,
    /// Records whose uid was already present.
    pub skipped: usize,
    /// Uids of the newly persisted records, in input order.
    pub ids: Vec<String>,
}

/// Number of indexed records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub synced: usize,
    pub failed: usize,
}

impl StatusCounts {
    /// Total indexed records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.synced + self.failed
    }
}

/// Current time as an ISO-8601 UTC timestamp with millisecond precision.
fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Index-backed record store.
///
/// Cloning is cheap; clones share the backend and the index lock, so index
/// mutations from concurrent tasks (e.g. sync workers) are serialized.
#[derive(Debug, Clone)]
pub struct RecordStore {
    backend: Arc<dyn KeyValueBackend>,
    index_lock: Arc<Mutex<()>>,
}

impl RecordStore {
    /// Creates a store over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            backend,
            index_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Name of the backend in use, for diagnostics.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Reads the index for a read path: a corrupted blob is logged and
    /// treated as empty.
    async fn read_index(&self) -> Result<Index> {
        let Some(raw) = self.backend.get(INDEX_KEY).await? else {
            return Ok(Index::new());
        };
        match parse_index(&raw) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!(error = %e, "record index is corrupted, reading as empty");
                Ok(Index::new())
            }
        }
    }

    /// Reads the index for a mutation: a corrupted blob is an error so it is
    /// never overwritten by a partial view.
    async fn load_index_for_update(&self) -> Result<Index> {
        let Some(raw) = self.backend.get(INDEX_KEY).await? else {
            return Ok(Index::new());
        };
        parse_index(&raw).map_err(|e| StoreError::CorruptIndex {
            message: e.to_string(),
        })
    }

    async fn save_index(&self, index: &Index) -> Result<()> {
        let raw = serialize_index(index).map_err(|e| StoreError::serialization("index", &e))?;
        self.backend.set(INDEX_KEY, &raw).await?;
        Ok(())
    }

    async fn save_body(&self, record: &StoredRecord) -> Result<()> {
        let body = serde_json::to_string(record)
            .map_err(|e| StoreError::serialization(format!("record {}", record.uid), &e))?;
        self.backend.set(&item_key(&record.uid), &body).await?;
        Ok(())
    }

    /// Fetches and decodes one body; `Ok(None)` when the body is absent.
    async fn load_body(&self, uid: &str) -> Result<Option<StoredRecord>> {
        let Some(raw) = self.backend.get(&item_key(uid)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::parse(uid, &e))
    }

    /// Fetches bodies concurrently, dropping missing or malformed ones.
    async fn load_bodies(&self, uids: &[String]) -> Vec<StoredRecord> {
        let results = join_all(uids.iter().map(|uid| self.load_body(uid))).await;

        uids.iter()
            .zip(results)
            .filter_map(|(uid, result)| match result {
                Ok(Some(record)) => Some(record),
                Ok(None) => {
                    debug!(uid = %uid, "index entry without body, skipping");
                    None
                }
                Err(e) => {
                    warn!(uid = %uid, error = %e, "unreadable record body, skipping");
                    None
                }
            })
            .collect()
    }

    /// Persists records whose uid is not yet indexed.
    ///
    /// The index is read once and flushed once per call. A record whose body
    /// cannot be written is logged and left out of `added`/`ids`; duplicates
    /// within the batch count as skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptIndex`] when the index blob cannot be
    /// decoded, or [`StoreError::Backend`] if the index cannot be read or
    /// flushed.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn write(&self, records: &[Record]) -> Result<WriteResult> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index_for_update().await?;
        let mut result = WriteResult::default();

        for record in records {
            let uid = record.uid();
            if index.contains_key(&uid) {
                result.skipped += 1;
                continue;
            }

            let stored = StoredRecord::pending(record, uid.clone(), now_iso());
            match self.save_body(&stored).await {
                Ok(()) => {
                    index.insert(uid.clone(), IndexEntry::from(&stored));
                    result.added += 1;
                    result.ids.push(uid);
                }
                Err(e) => warn!(uid = %uid, error = %e, "failed to persist record, skipping"),
            }
        }

        if result.added > 0 {
            self.save_index(&index).await?;
        }

        info!(
            added = result.added,
            skipped = result.skipped,
            "records written"
        );
        Ok(result)
    }

    /// Persists a single record. See [`RecordStore::write`].
    ///
    /// # Errors
    ///
    /// Same as [`RecordStore::write`].
    pub async fn write_one(&self, record: &Record) -> Result<WriteResult> {
        self.write(std::slice::from_ref(record)).await
    }

    /// Returns every indexed record whose body is readable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the index cannot be read.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<StoredRecord>> {
        let index = self.read_index().await?;
        let uids: Vec<String> = index.into_keys().collect();
        Ok(self.load_bodies(&uids).await)
    }

    /// Returns indexed records with status `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the index cannot be read.
    #[instrument(skip(self))]
    pub async fn read_pending(&self) -> Result<Vec<StoredRecord>> {
        self.read_with_status(RecordStatus::Pending).await
    }

    /// Returns indexed records with the given status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the index cannot be read.
    pub async fn read_with_status(&self, status: RecordStatus) -> Result<Vec<StoredRecord>> {
        let index = self.read_index().await?;
        let uids = uids_with_status(&index, status);
        Ok(self.load_bodies(&uids).await)
    }

    /// Fetches one record body.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Parse`] for a malformed body or
    /// [`StoreError::Backend`] if the read fails.
    pub async fn get(&self, uid: &str) -> Result<Option<StoredRecord>> {
        self.load_body(uid).await
    }

    /// Returns the indexed status for a uid, or `None` when not indexed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the index cannot be read.
    pub async fn status_of(&self, uid: &str) -> Result<Option<RecordStatus>> {
        let index = self.read_index().await?;
        Ok(index.get(uid).map(|entry| entry.status))
    }

    /// Moves a record to a new status.
    ///
    /// Setting the status a record already has performs no writes, unless
    /// the index still disagrees with the body (an earlier index flush
    /// failed), in which case only the index is rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no body exists for `uid`,
    /// [`StoreError::CorruptIndex`] if the index cannot be decoded, or
    /// [`StoreError::Backend`] if persistence fails.
    #[instrument(skip(self), fields(status = %status))]
    pub async fn update_status(&self, uid: &str, status: RecordStatus) -> Result<()> {
        let _guard = self.index_lock.lock().await;

        let mut record = self
            .load_body(uid)
            .await?
            .ok_or_else(|| StoreError::NotFound(uid.to_string()))?;
        let mut index = self.load_index_for_update().await?;
        let indexed = index.get(uid).map(|entry| entry.status);

        if record.status == status {
            if indexed == Some(status) {
                debug!(uid, "status unchanged, nothing to write");
                return Ok(());
            }
            warn!(uid, ?indexed, "index disagrees with record body, repairing entry");
        } else {
            record.status = status;
            self.save_body(&record).await?;
        }

        index.insert(uid.to_string(), IndexEntry::from(&record));
        self.save_index(&index).await
    }

    /// Deletes a record body and its index entry.
    ///
    /// Removing an absent record is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptIndex`] if the index cannot be decoded, or
    /// [`StoreError::Backend`] if the index cannot be read or flushed.
    #[instrument(skip(self))]
    pub async fn remove(&self, uid: &str) -> Result<()> {
        let _guard = self.index_lock.lock().await;

        if let Err(e) = self.backend.remove(&item_key(uid)).await {
            warn!(uid, error = %e, "failed to delete record body");
        }

        let mut index = self.load_index_for_update().await?;
        if index.remove(uid).is_some() {
            self.save_index(&index).await?;
        }
        Ok(())
    }

    /// Counts indexed records per status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the index cannot be read.
    pub async fn count_by_status(&self) -> Result<StatusCounts> {
        let index = self.read_index().await?;
        let mut counts = StatusCounts::default();
        for entry in index.values() {
            match entry.status {
                RecordStatus::Pending => counts.pending += 1,
                RecordStatus::Synced => counts.synced += 1,
                RecordStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    /// Moves every `failed` record back to `pending` so the next sync retries it.
    ///
    /// Returns the number of records requeued.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptIndex`] if the index cannot be decoded, or
    /// [`StoreError::Backend`] if the index cannot be read or flushed.
    #[instrument(skip(self))]
    pub async fn requeue_failed(&self) -> Result<usize> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index_for_update().await?;
        let failed = uids_with_status(&index, RecordStatus::Failed);

        let mut requeued = 0usize;
        for mut record in self.load_bodies(&failed).await {
            record.status = RecordStatus::Pending;
            match self.save_body(&record).await {
                Ok(()) => {
                    index.insert(record.uid.clone(), IndexEntry::from(&record));
                    requeued += 1;
                }
                Err(e) => warn!(uid = %record.uid, error = %e, "failed to requeue record"),
            }
        }

        if requeued > 0 {
            self.save_index(&index).await?;
        }
        info!(requeued, "failed records requeued");
        Ok(requeued)
    }

    /// Removes every record of one animal.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptIndex`] if the index cannot be decoded, or
    /// [`StoreError::Backend`] if the index cannot be read or flushed.
    #[instrument(skip(self))]
    pub async fn remove_by_codigo(&self, codigo: &str) -> Result<usize> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index_for_update().await?;
        let uids: Vec<String> = index.keys().cloned().collect();

        let mut removed = 0usize;
        for record in self.load_bodies(&uids).await {
            if record.codigo != codigo {
                continue;
            }
            if let Err(e) = self.backend.remove(&item_key(&record.uid)).await {
                warn!(uid = %record.uid, error = %e, "failed to delete record body");
            }
            index.remove(&record.uid);
            removed += 1;
        }

        if removed > 0 {
            self.save_index(&index).await?;
        }
        info!(codigo, removed, "records removed for animal");
        Ok(removed)
    }

    /// Rebuilds the index from the stored bodies' own status and timestamps.
    ///
    /// This is the only operation that overwrites a corrupted index. Bodies
    /// that do not parse are left out and logged. Returns the number of
    /// indexed records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if keys cannot be listed or the index
    /// cannot be written.
    #[instrument(skip(self))]
    pub async fn rebuild_index(&self) -> Result<usize> {
        let _guard = self.index_lock.lock().await;
        let keys = self.backend.keys_with_prefix(ITEM_KEY_PREFIX).await?;
        let uids: Vec<String> = keys
            .iter()
            .filter_map(|key| keys::uid_from_item_key(key))
            .map(str::to_string)
            .collect();

        let index: Index = self
            .load_bodies(&uids)
            .await
            .iter()
            .map(|record| (record.uid.clone(), IndexEntry::from(record)))
            .collect();

        self.save_index(&index).await?;
        info!(
            bodies = uids.len(),
            indexed = index.len(),
            "record index rebuilt"
        );
        Ok(index.len())
    }
}
