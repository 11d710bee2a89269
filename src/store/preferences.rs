//! File-based preference store (primary backend).
//!
//! Each key is one file under a directory. Keys are percent-encoded into file
//! names so `:` and `|` in uids are safe on every platform, and writes go to a
//! temporary file that is renamed over the target.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{BackendError, KeyValueBackend};

const BACKEND_NAME: &str = "preferences";
const VALUE_EXTENSION: &str = ".json";
const TEMP_EXTENSION: &str = ".tmp";

/// Directory-backed key/value store.
#[derive(Debug, Clone)]
pub struct PreferencesBackend {
    dir: PathBuf,
}

impl PreferencesBackend {
    /// Uses an existing directory without touching the filesystem.
    ///
    /// Operations fail with [`BackendError::Unavailable`] while the directory
    /// does not exist.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates the directory when needed and returns the backend.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the directory cannot be created.
    #[instrument(skip(dir), fields(dir = %dir.as_ref().display()))]
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, BackendError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| BackendError::Unavailable {
                backend: BACKEND_NAME,
                reason: format!("cannot create {}: {e}", dir.display()),
            })?;
        Ok(Self::new(dir))
    }

    /// Returns the backing directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{VALUE_EXTENSION}", urlencoding::encode(key)))
    }

    async fn ensure_available(&self) -> Result<(), BackendError> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(BackendError::Unavailable {
                backend: BACKEND_NAME,
                reason: format!("{} is not a directory", self.dir.display()),
            }),
            Err(e) => Err(BackendError::Unavailable {
                backend: BACKEND_NAME,
                reason: format!("{}: {e}", self.dir.display()),
            }),
        }
    }
}

#[async_trait]
impl KeyValueBackend for PreferencesBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.ensure_available().await?;
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io(key, e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.ensure_available().await?;
        let path = self.path_for(key);
        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_EXTENSION);
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, value)
            .await
            .map_err(|e| BackendError::io(key, e))?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(BackendError::io(key, e));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.ensure_available().await?;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::io(key, e)),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        self.ensure_available().await?;
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| BackendError::io(prefix, e))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackendError::io(prefix, e))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(encoded) = name.strip_suffix(VALUE_EXTENSION) else {
                continue;
            };
            match urlencoding::decode(encoded) {
                Ok(key) if key.starts_with(prefix) => keys.push(key.into_owned()),
                Ok(_) => {}
                Err(e) => debug!(file = name, error = %e, "skipping undecodable preference file"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
