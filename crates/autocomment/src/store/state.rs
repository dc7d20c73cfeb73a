//! Registry document and storage trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::StorageResult;

/// Stored sign-in progress for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(default)]
    pub signed_in: bool,
    /// Hash returned with the last verification code request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_code_hash: Option<String>,
}

/// Everything the registry persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountRecord>,
    #[serde(default)]
    pub comments: Vec<String>,
}

/// Storage interface for the registry document.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the document. A missing document loads as empty.
    async fn load(&self) -> StorageResult<RegistryState>;

    /// Replace the document. Must be atomic.
    async fn save(&self, state: &RegistryState) -> StorageResult<()>;
}
