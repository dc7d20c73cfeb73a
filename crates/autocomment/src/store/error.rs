//! Registry storage errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot access registry file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not a registry document.
    #[error("registry file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode registry: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.into(),
            source,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
