//! `SQLite` fallback backend.
//!
//! Record bodies are rows of the `registros` table. The table has no place
//! for a free-standing index blob, so the index key is emulated:
//! - reading it synthesizes the index from the `status`/`created_at` columns;
//! - writing it applies each entry's status to the matching row, and entries
//!   without a row are dropped (logged).
//!
//! Any key outside the record namespace is rejected with
//! [`BackendError::UnsupportedKey`]. Under this backend the index can never
//! disagree with the bodies, but it also cannot hold entries for bodies that
//! failed to persist.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::Row;
use tracing::{debug, instrument, warn};

use super::index::{Index, IndexEntry, parse_index, serialize_index};
use super::keys::{INDEX_KEY, item_key, uid_from_item_key};
use super::{BackendError, KeyValueBackend};
use crate::db::Database;
use crate::record::RecordStatus;

const BACKEND_NAME: &str = "sqlite";

/// Columns extracted from a body before it is stored.
#[derive(Debug, Deserialize)]
struct BodyColumns {
    #[serde(default)]
    codigo: String,
    #[serde(default)]
    fecha: String,
    status: RecordStatus,
    #[serde(rename = "createdAt", default)]
    created_at: String,
}

/// Key/value view over the `registros` table.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db: Database,
}

impl SqliteBackend {
    /// Wraps an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    async fn synthesize_index(&self) -> Result<String, BackendError> {
        let rows = sqlx::query("SELECT uid, status, created_at FROM registros ORDER BY uid")
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| BackendError::database(INDEX_KEY, &e))?;

        let mut index = Index::new();
        for row in rows {
            let uid: String = row.get("uid");
            let status: String = row.get("status");
            let created_at: String = row.get("created_at");
            match status.parse::<RecordStatus>() {
                Ok(status) => {
                    index.insert(uid, IndexEntry::new(status, created_at));
                }
                Err(message) => warn!(uid = %uid, %message, "skipping row with unknown status"),
            }
        }

        serialize_index(&index).map_err(|e| BackendError::InvalidValue {
            key: INDEX_KEY.to_string(),
            message: e.to_string(),
        })
    }

    #[instrument(skip(self, value))]
    async fn apply_index(&self, value: &str) -> Result<(), BackendError> {
        let index = parse_index(value).map_err(|e| BackendError::InvalidValue {
            key: INDEX_KEY.to_string(),
            message: e.to_string(),
        })?;

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| BackendError::database(INDEX_KEY, &e))?;

        let mut dropped = 0usize;
        for (uid, entry) in &index {
            let result = sqlx::query(
                r"UPDATE registros
                  SET status = ?, updated_at = datetime('now')
                  WHERE uid = ? AND status <> ?",
            )
            .bind(entry.status.as_str())
            .bind(uid)
            .bind(entry.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| BackendError::database(INDEX_KEY, &e))?;

            if result.rows_affected() == 0 {
                let exists = sqlx::query("SELECT 1 FROM registros WHERE uid = ?")
                    .bind(uid)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| BackendError::database(INDEX_KEY, &e))?
                    .is_some();
                if !exists {
                    dropped += 1;
                    debug!(uid = %uid, "index entry has no row, dropped");
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| BackendError::database(INDEX_KEY, &e))?;

        if dropped > 0 {
            warn!(dropped, "fallback storage cannot keep index entries without a record row");
        }
        Ok(())
    }

    async fn upsert_body(&self, key: &str, uid: &str, value: &str) -> Result<(), BackendError> {
        let columns: BodyColumns =
            serde_json::from_str(value).map_err(|e| BackendError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        sqlx::query(
            r"INSERT INTO registros (uid, body, codigo, fecha, status, created_at)
              VALUES (?, ?, ?, ?, ?, ?)
              ON CONFLICT(uid) DO UPDATE SET
                  body = excluded.body,
                  codigo = excluded.codigo,
                  fecha = excluded.fecha,
                  status = excluded.status,
                  updated_at = datetime('now')",
        )
        .bind(uid)
        .bind(value)
        .bind(&columns.codigo)
        .bind(&columns.fecha)
        .bind(columns.status.as_str())
        .bind(&columns.created_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| BackendError::database(key, &e))?;

        Ok(())
    }

    fn unsupported(key: &str) -> BackendError {
        BackendError::UnsupportedKey {
            backend: BACKEND_NAME,
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl KeyValueBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        if key == INDEX_KEY {
            return self.synthesize_index().await.map(Some);
        }
        let uid = uid_from_item_key(key).ok_or_else(|| Self::unsupported(key))?;

        let row = sqlx::query("SELECT body FROM registros WHERE uid = ?")
            .bind(uid)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| BackendError::database(key, &e))?;

        Ok(row.map(|row| row.get("body")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        if key == INDEX_KEY {
            return self.apply_index(value).await;
        }
        let uid = uid_from_item_key(key).ok_or_else(|| Self::unsupported(key))?;
        self.upsert_body(key, uid, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        if key == INDEX_KEY {
            // Derived from rows; nothing to delete.
            return Ok(());
        }
        let uid = uid_from_item_key(key).ok_or_else(|| Self::unsupported(key))?;

        sqlx::query("DELETE FROM registros WHERE uid = ?")
            .bind(uid)
            .execute(self.db.pool())
            .await
            .map_err(|e| BackendError::database(key, &e))?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let rows = sqlx::query("SELECT uid FROM registros ORDER BY uid")
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| BackendError::database(prefix, &e))?;

        Ok(rows
            .into_iter()
            .map(|row| item_key(&row.get::<String, _>("uid")))
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn backend() -> SqliteBackend {
        SqliteBackend::new(Database::new_in_memory().await.unwrap())
    }

    fn body(uid: &str, status: &str) -> String {
        format!(
            r#"{{"id":"{uid}","codigo":"V001","peso":12.5,"fecha":"01/03/2024","hora":"06:00","turno":"am","raw":"","uid":"{uid}","status":"{status}","createdAt":"2024-03-01T06:00:00.000Z"}}"#
        )
    }

    #[tokio::test]
    async fn test_sqlite_body_round_trip() {
        let backend = backend().await;
        let key = item_key("u1");

        backend.set(&key, &body("u1", "pending")).await.unwrap();
        assert_eq!(
            backend.get(&key).await.unwrap(),
            Some(body("u1", "pending"))
        );
        assert_eq!(backend.get(&item_key("missing")).await.unwrap(), None);

        backend.remove(&key).await.unwrap();
        assert_eq!(backend.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_index_is_synthesized_from_rows() {
        let backend = backend().await;
        backend
            .set(&item_key("u1"), &body("u1", "pending"))
            .await
            .unwrap();
        backend
            .set(&item_key("u2"), &body("u2", "synced"))
            .await
            .unwrap();

        let raw = backend.get(INDEX_KEY).await.unwrap().unwrap();
        let index = parse_index(&raw).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index["u1"].status, RecordStatus::Pending);
        assert_eq!(index["u2"].status, RecordStatus::Synced);
        assert_eq!(index["u1"].created_at, "2024-03-01T06:00:00.000Z");
    }

    #[tokio::test]
    async fn test_sqlite_index_write_updates_rows_and_drops_orphans() {
        let backend = backend().await;
        backend
            .set(&item_key("u1"), &body("u1", "pending"))
            .await
            .unwrap();

        let mut index = Index::new();
        index.insert("u1".into(), IndexEntry::new(RecordStatus::Failed, "t"));
        index.insert("ghost".into(), IndexEntry::new(RecordStatus::Pending, "t"));
        backend
            .set(INDEX_KEY, &serialize_index(&index).unwrap())
            .await
            .unwrap();

        let synthesized = parse_index(&backend.get(INDEX_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(synthesized.len(), 1);
        assert_eq!(synthesized["u1"].status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn test_sqlite_rejects_foreign_keys() {
        let backend = backend().await;
        let result = backend.set("settings:host", "x").await;
        assert!(matches!(result, Err(BackendError::UnsupportedKey { .. })));
        let result = backend.get("settings:host").await;
        assert!(matches!(result, Err(BackendError::UnsupportedKey { .. })));
    }

    #[tokio::test]
    async fn test_sqlite_rejects_body_without_status() {
        let backend = backend().await;
        let result = backend.set(&item_key("u1"), r#"{"codigo":"V001"}"#).await;
        assert!(matches!(result, Err(BackendError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_sqlite_keys_with_prefix_lists_item_keys() {
        let backend = backend().await;
        backend
            .set(&item_key("b"), &body("b", "pending"))
            .await
            .unwrap();
        backend
            .set(&item_key("a"), &body("a", "pending"))
            .await
            .unwrap();

        let keys = backend
            .keys_with_prefix(super::super::keys::ITEM_KEY_PREFIX)
            .await
            .unwrap();
        assert_eq!(keys, vec![item_key("a"), item_key("b")]);
    }
}
