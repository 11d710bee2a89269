//! Registros Core Library
//!
//! Offline-first capture of dairy-herd weight readings ("registros"): records
//! are pulled from a scale device over the local network, deduplicated into a
//! persistent store, and pushed to a remote server when connectivity allows.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - SQLite connection and schema management
//! - [`record`] - Record model, uid derivation and delivery status
//! - [`store`] - Key/value record store with an index and backend failover
//! - [`ingest`] - Payload parsing, normalization and deduplicated ingestion
//! - [`host`] - Data-host downloader with dual transports and path probing
//! - [`sync`] - Bounded worker pool that delivers pending records
//! - [`network`] - Online/offline monitor with subscribers
//! - [`summary`] - Daily production totals, trend analysis and a short prediction

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod db;
pub mod host;
pub mod ingest;
pub mod network;
pub mod record;
pub mod store;
pub mod summary;
pub mod sync;
mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use db::{Database, DbError};
pub use host::{
    DEFAULT_CONFIRM_TIMEOUT_MS, DEFAULT_DOWNLOAD_TIMEOUT_MS, DEFAULT_HOST, FailureKind,
    HostDownloader, HostError, HostPayload, normalize_host,
};
pub use ingest::{IngestError, IngestReport, Ingestor};
pub use network::{ConnectivityProbe, NetworkMonitor, Subscription, TcpProbe};
pub use record::{Record, RecordStatus, StoredRecord, Turno, uid_for};
pub use store::{
    BackendError, FailoverBackend, KeyValueBackend, MemoryBackend, PreferencesBackend,
    RecordStore, SqliteBackend, StatusCounts, StoreError, WriteResult,
};
pub use summary::{
    Analysis, Confidence, DailyTotal, Outlook, Prediction, TimeRange, Trend, analyze,
    daily_totals, filter_by_range, predict,
};
pub use sync::{
    DEFAULT_SYNC_CONCURRENCY, HttpRecordSender, RecordSender, SendOutcome, SyncEngine, SyncError,
    SyncReport,
};
