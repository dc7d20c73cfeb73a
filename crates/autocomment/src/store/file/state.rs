//! File-based registry storage.
//!
//! Stores the whole registry as one pretty-printed JSON document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use crate::store::error::{StorageError, StorageResult};
use crate::store::state::{RegistryState, StateStore};

/// File-based implementation of `StateStore`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists.
    async fn ensure_dir(&self) -> StorageResult<()> {
        let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return Ok(());
        };
        fs::create_dir_all(dir)
            .await
            .map_err(|e| StorageError::io(dir, e))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> StorageResult<RegistryState> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RegistryState::default());
            }
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        let mut value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| StorageError::corrupt(&self.path, e))?;

        // A malformed accounts section is reset rather than rejected
        if let Some(doc) = value.as_object_mut()
            && doc.get("accounts").is_some_and(|a| !a.is_object())
        {
            warn!(path = %self.path.display(), "Accounts section is not a map, resetting");
            doc.remove("accounts");
        }

        serde_json::from_value(value)
            .map_err(|e| StorageError::corrupt(&self.path, e))
    }

    async fn save(&self, state: &RegistryState) -> StorageResult<()> {
        self.ensure_dir().await?;

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(state)
            .map_err(StorageError::Encode)?;

        // Write to temp file first
        fs::write(&temp_path, content)
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;

        // Atomic rename
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;

        Ok(())
    }
}
