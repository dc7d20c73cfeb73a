//! Account and comment registry.
//!
//! Every mutation is a load-modify-save cycle under one async lock, so
//! concurrent control requests never lose each other's writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::StorageError;
use super::state::{AccountRecord, RegistryState, StateStore};
use crate::connector::AccountIdentity;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("account '{0}' is already signed in")]
    AlreadySignedIn(String),

    #[error("no verification code was requested for account '{0}'")]
    CodeNotRequested(String),

    #[error("comment must not be blank")]
    EmptyComment,

    #[error("invalid account '{0}': expected a phone number such as +15550100")]
    InvalidAccount(String),
}

/// Longest phone number allowed by E.164.
const MAX_PHONE_DIGITS: usize = 15;

/// Check that an account key is a phone number: an optional `+` followed by
/// digits. Keys name files under the sessions directory, so nothing else passes.
pub fn validate_account_key(key: &str) -> Result<(), RegistryError> {
    let digits = key.strip_prefix('+').unwrap_or(key);
    if digits.is_empty()
        || digits.len() > MAX_PHONE_DIGITS
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(RegistryError::InvalidAccount(key.to_string()));
    }
    Ok(())
}

/// Registry of accounts and the comment pool.
#[derive(Clone)]
pub struct AccountRegistry {
    store: Arc<dyn StateStore>,
    sessions_dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn StateStore>, sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            sessions_dir: sessions_dir.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Session file for an account key.
    pub fn credential_path(&self, key: &str) -> PathBuf {
        self.sessions_dir.join(format!("{key}.session"))
    }

    pub async fn snapshot(&self) -> Result<RegistryState, RegistryError> {
        Ok(self.store.load().await?)
    }

    pub async fn comments(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.store.load().await?.comments)
    }

    /// Identity for `key`, known or not. Unknown accounts are not authorized.
    pub async fn identity(&self, key: &str) -> Result<AccountIdentity, RegistryError> {
        validate_account_key(key)?;
        let state = self.store.load().await?;
        let signed_in = state.accounts.get(key).is_some_and(|a| a.signed_in);
        Ok(AccountIdentity::new(key, signed_in, self.credential_path(key)))
    }

    /// Identities of every signed-in account, ordered by key.
    pub async fn signed_in_identities(&self) -> Result<Vec<AccountIdentity>, RegistryError> {
        let state = self.store.load().await?;
        Ok(state
            .accounts
            .iter()
            .filter(|(_, record)| record.signed_in)
            .filter(|(key, _)| match validate_account_key(key) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Skipping stored account");
                    false
                }
            })
            .map(|(key, _)| AccountIdentity::new(key.as_str(), true, self.credential_path(key)))
            .collect())
    }

    // ------------------------------------------------------------------------
    // Sign-in
    // ------------------------------------------------------------------------

    /// Remember the hash from a verification code request.
    pub async fn record_code_hash(&self, key: &str, hash: &str) -> Result<(), RegistryError> {
        validate_account_key(key)?;
        self.update(|state| {
            let record = state.accounts.entry(key.to_string()).or_default();
            if record.signed_in {
                return Err(RegistryError::AlreadySignedIn(key.to_string()));
            }
            record.phone_code_hash = Some(hash.to_string());
            Ok(())
        })
        .await?;
        debug!(account = %key, "Verification code hash stored");
        Ok(())
    }

    /// Hash stored by the last code request for an account not yet signed in.
    pub async fn pending_code_hash(&self, key: &str) -> Result<String, RegistryError> {
        validate_account_key(key)?;
        let state = self.store.load().await?;
        match state.accounts.get(key) {
            Some(AccountRecord {
                signed_in: true, ..
            }) => Err(RegistryError::AlreadySignedIn(key.to_string())),
            Some(AccountRecord {
                phone_code_hash: Some(hash),
                ..
            }) => Ok(hash.clone()),
            _ => Err(RegistryError::CodeNotRequested(key.to_string())),
        }
    }

    pub async fn mark_signed_in(&self, key: &str) -> Result<(), RegistryError> {
        validate_account_key(key)?;
        self.update(|state| {
            let record = state.accounts.entry(key.to_string()).or_default();
            record.signed_in = true;
            record.phone_code_hash = None;
            Ok(())
        })
        .await?;
        info!(account = %key, "Account signed in");
        Ok(())
    }

    /// Forget an account and delete its session file. Returns whether it was known.
    pub async fn remove_account(&self, key: &str) -> Result<bool, RegistryError> {
        validate_account_key(key)?;
        let known = self
            .update(|state| Ok(state.accounts.remove(key).is_some()))
            .await?;

        let credential = self.credential_path(key);
        match tokio::fs::remove_file(&credential).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(account = %key, path = %credential.display(), error = %e, "Failed to delete session file");
            }
        }
        if known {
            info!(account = %key, "Account removed");
        }
        Ok(known)
    }

    // ------------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------------

    pub async fn add_comment(&self, text: &str) -> Result<Vec<String>, RegistryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RegistryError::EmptyComment);
        }
        self.update(|state| {
            state.comments.push(text.to_string());
            Ok(state.comments.clone())
        })
        .await
    }

    /// Remove the first comment equal to `text`. Returns whether one was removed.
    pub async fn remove_comment(&self, text: &str) -> Result<bool, RegistryError> {
        self.update(|state| {
            let Some(index) = state.comments.iter().position(|c| c == text) else {
                return Ok(false);
            };
            state.comments.remove(index);
            Ok(true)
        })
        .await
    }

    async fn update<T>(
        &self,
        f: impl FnOnce(&mut RegistryState) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let _guard = self.lock.lock().await;
        let mut state = self.store.load().await?;
        let out = f(&mut state)?;
        self.store.save(&state).await?;
        Ok(out)
    }
}
