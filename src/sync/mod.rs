//! Push-sync of pending records through a small worker pool.
//!
//! # Concurrency Model
//!
//! - All pending records are read once into a shared queue
//! - `concurrency` cooperative workers run concurrently via `join_all`
//! - A worker claims the next record by popping under a mutex; the lock is
//!   never held across an await, so no two workers can claim the same record
//! - Before sending, the worker re-reads the record's status and skips it if
//!   it is no longer `pending`
//!
//! # Outcomes
//!
//! | Sender result | Stored status | Counted as |
//! |---------------|---------------|------------|
//! | `Sent` | `synced` | sent |
//! | `Retryable` | `failed` | failed |
//! | `Permanent` | `failed` | failed |
//! | `Err` | `failed` | failed |
//!
//! Retryable and permanent failures are stored the same way; there is no
//! backoff or retry counter. `failed` records wait for a manual re-sync
//! ([`crate::store::RecordStore::requeue_failed`]).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use registros_core::store::{MemoryBackend, RecordStore};
//! use registros_core::sync::{HttpRecordSender, SyncEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RecordStore::new(Arc::new(MemoryBackend::new()));
//! let sender = HttpRecordSender::new("https://example.com/api/registros")?;
//! let report = SyncEngine::new(2)?.sync_pending(&store, &sender).await?;
//! println!("sent {}/{}", report.sent, report.total);
//! # Ok(())
//! # }
//! ```

mod constants;
mod sender;

pub use constants::{SEND_CONNECT_TIMEOUT_SECS, SEND_REQUEST_TIMEOUT_SECS};
pub use sender::{HttpRecordSender, RecordSender, SendError, SendOutcome, classify_status};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use futures_util::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::record::{RecordStatus, StoredRecord};
use crate::store::{RecordStore, StoreError};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 16;

/// Default number of concurrent senders.
pub const DEFAULT_SYNC_CONCURRENCY: usize = 2;

/// Error type for sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Reading the pending records failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Counts from one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Pending records at the start of the run.
    pub total: usize,
    /// Records accepted by the remote.
    pub sent: usize,
    /// Records whose delivery failed.
    pub failed: usize,
    /// Records no longer pending when claimed.
    pub skipped: usize,
}

/// Atomic counters shared by the workers of one run.
#[derive(Debug, Default)]
struct SyncStats {
    sent: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl SyncStats {
    fn increment_sent(&self) {
        self.sent.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    fn report(&self, total: usize) -> SyncReport {
        SyncReport {
            total,
            sent: self.sent.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }
}

/// Work queue claimed by workers one record at a time.
#[derive(Debug)]
struct WorkQueue {
    items: Mutex<VecDeque<StoredRecord>>,
}

impl WorkQueue {
    fn new(records: Vec<StoredRecord>) -> Self {
        Self {
            items: Mutex::new(records.into()),
        }
    }

    /// Atomically claims the next record.
    fn claim(&self) -> Option<StoredRecord> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

/// Bounded-concurrency sync of pending records.
#[derive(Debug, Clone, Copy)]
pub struct SyncEngine {
    concurrency: usize,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_SYNC_CONCURRENCY,
        }
    }
}

impl SyncEngine {
    /// Creates an engine running `concurrency` workers.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-16).
    pub fn new(concurrency: usize) -> Result<Self, SyncError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(SyncError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self { concurrency })
    }

    /// Returns the configured worker count.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Sends every pending record and updates its status.
    ///
    /// One record's failure never stops the others, and a failure while
    /// recording a status is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] only if the initial pending read fails.
    #[instrument(skip(self, store, sender), fields(concurrency = self.concurrency))]
    pub async fn sync_pending(
        &self,
        store: &RecordStore,
        sender: &dyn RecordSender,
    ) -> Result<SyncReport, SyncError> {
        let pending = store.read_pending().await?;
        let total = pending.len();
        if total == 0 {
            debug!("no pending records to sync");
            return Ok(SyncReport::default());
        }

        let queue = WorkQueue::new(pending);
        let stats = SyncStats::default();
        let workers = (0..self.concurrency.min(total))
            .map(|worker| run_worker(worker, &queue, store, sender, &stats));
        join_all(workers).await;

        let report = stats.report(total);
        info!(
            total = report.total,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "sync finished"
        );
        Ok(report)
    }
}

async fn run_worker(
    worker: usize,
    queue: &WorkQueue,
    store: &RecordStore,
    sender: &dyn RecordSender,
    stats: &SyncStats,
) {
    while let Some(record) = queue.claim() {
        match store.status_of(&record.uid).await {
            Ok(Some(RecordStatus::Pending)) => {}
            Ok(status) => {
                debug!(worker, uid = %record.uid, ?status, "record no longer pending, skipping");
                stats.increment_skipped();
                continue;
            }
            Err(e) => {
                warn!(worker, uid = %record.uid, error = %e, "cannot re-check status, skipping");
                stats.increment_skipped();
                continue;
            }
        }

        let next_status = match sender.send_one(&record).await {
            Ok(SendOutcome::Sent) => {
                stats.increment_sent();
                RecordStatus::Synced
            }
            Ok(SendOutcome::Retryable(message)) => {
                warn!(worker, uid = %record.uid, retryable = true, %message, "send failed");
                stats.increment_failed();
                RecordStatus::Failed
            }
            Ok(SendOutcome::Permanent(message)) => {
                warn!(worker, uid = %record.uid, retryable = false, %message, "send rejected");
                stats.increment_failed();
                RecordStatus::Failed
            }
            Err(e) => {
                warn!(worker, uid = %record.uid, error = %e, "sender error");
                stats.increment_failed();
                RecordStatus::Failed
            }
        };

        if let Err(e) = store.update_status(&record.uid, next_status).await {
            warn!(worker, uid = %record.uid, status = %next_status, error = %e, "failed to record sync status");
        }
    }
}
