//! Error types for record store operations.

use std::fmt;

use thiserror::Error;

/// Structured classification for fallback-database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Filesystem or transport IO failure.
    Io,
    /// Unclassified database failure.
    Other,
}

impl DbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::Io => "io",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> DbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return DbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return DbErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked") || message.contains("database is busy") {
        return DbErrorKind::BusyOrLocked;
    }

    DbErrorKind::Other
}

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend cannot be used at all (missing directory, closed pool, ...).
    #[error("{backend} storage unavailable: {reason}")]
    Unavailable {
        /// Backend name.
        backend: &'static str,
        /// Why it is unavailable.
        reason: String,
    },

    /// Filesystem error while reading or writing a key.
    #[error("storage IO error for key '{key}': {source}")]
    Io {
        /// The key being accessed.
        key: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Fallback database failure.
    #[error("database error ({kind}) for key '{key}': {message}")]
    Database {
        /// The key being accessed.
        key: String,
        /// Typed classification.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// The backend cannot represent this key.
    #[error("{backend} storage does not support key '{key}'")]
    UnsupportedKey {
        /// Backend name.
        backend: &'static str,
        /// The rejected key.
        key: String,
    },

    /// The value handed to the backend is not what the key requires.
    #[error("invalid value for key '{key}': {message}")]
    InvalidValue {
        /// The key being written.
        key: String,
        /// What was wrong with it.
        message: String,
    },
}

impl BackendError {
    /// Creates an IO error for a key.
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }

    /// Creates a database error for a key.
    pub fn database(key: impl Into<String>, error: &sqlx::Error) -> Self {
        Self::Database {
            key: key.into(),
            kind: DbErrorKind::from_sqlx(error),
            message: error.to_string(),
        }
    }
}

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record body exists for the uid.
    #[error("record not found: uid {0}\n  Suggestion: The record may have been removed or the uid is incorrect")]
    NotFound(String),

    /// Underlying persistence failed.
    #[error("storage error: {0}")]
    Backend(#[from] BackendError),

    /// A stored record body is not valid JSON for a record.
    #[error("malformed stored record {uid}: {message}")]
    Parse {
        /// The affected record.
        uid: String,
        /// Parser message.
        message: String,
    },

    /// The index blob exists but cannot be decoded; mutations are refused.
    #[error("record index is corrupted: {message}\n  Suggestion: Run `registros repair-index` to rebuild it from record bodies")]
    CorruptIndex {
        /// Parser message.
        message: String,
    },

    /// A record or index could not be serialized.
    #[error("failed to serialize {what}: {message}")]
    Serialization {
        /// What was being serialized.
        what: String,
        /// Serializer message.
        message: String,
    },
}

impl StoreError {
    /// Creates a parse error for a stored body.
    pub fn parse(uid: impl Into<String>, error: &serde_json::Error) -> Self {
        Self::Parse {
            uid: uid.into(),
            message: error.to_string(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(what: impl Into<String>, error: &serde_json::Error) -> Self {
        Self::Serialization {
            what: what.into(),
            message: error.to_string(),
        }
    }

    /// Returns true when the failure is a missing record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
