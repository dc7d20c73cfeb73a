//! Operator-facing operations shared by the HTTP API and the CLI.
//!
//! Joins the registry (what is persisted) with the engine (what is live).

use thiserror::Error;
use tracing::info;

use crate::engine::{EngineError, EngineHandle, EngineStatus, StartReport, StopReport};
use crate::store::{AccountRegistry, RegistryError, RegistryState, validate_account_key};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("at least one account and one comment are required")]
    NotEnoughAccountsOrComments,

    #[error("no account is signed in")]
    NoSignedInAccounts,

    #[error("engine is already running")]
    AlreadyRunning,
}

/// Outcome of confirming a verification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    SignedIn,
    /// The service did not report the account as authorized.
    NotAuthorized,
}

#[derive(Clone)]
pub struct Controller {
    registry: AccountRegistry,
    engine: EngineHandle,
}

impl Controller {
    pub fn new(registry: AccountRegistry, engine: EngineHandle) -> Self {
        Self { registry, engine }
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub async fn accounts(&self) -> Result<RegistryState, ControlError> {
        Ok(self.registry.snapshot().await?)
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    /// Ask the service to send a verification code and remember its hash.
    pub async fn request_code(&self, phone: &str) -> Result<(), ControlError> {
        let identity = self.registry.identity(phone).await?;
        if identity.authorized {
            return Err(RegistryError::AlreadySignedIn(phone.to_string()).into());
        }
        let hash = self.engine.request_verification_code(identity).await?;
        self.registry.record_code_hash(phone, &hash).await?;
        info!(account = %phone, "Verification code requested");
        Ok(())
    }

    /// Finish sign-in with the code the account received.
    pub async fn confirm(
        &self,
        phone: &str,
        code: &str,
        password: Option<&str>,
    ) -> Result<Confirmation, ControlError> {
        let hash = self.registry.pending_code_hash(phone).await?;
        let identity = self.registry.identity(phone).await?;
        let authorized = self
            .engine
            .confirm_account(
                identity,
                code.to_string(),
                hash,
                password.map(str::to_string),
            )
            .await?;

        if !authorized {
            return Ok(Confirmation::NotAuthorized);
        }
        self.registry.mark_signed_in(phone).await?;
        Ok(Confirmation::SignedIn)
    }

    /// Stop the account's session if live, then forget it.
    pub async fn remove_account(&self, phone: &str) -> Result<bool, ControlError> {
        validate_account_key(phone)?;
        self.engine.stop_one(phone).await?;
        Ok(self.registry.remove_account(phone).await?)
    }

    pub async fn stop_account(&self, phone: &str) -> Result<bool, ControlError> {
        Ok(self.engine.stop_one(phone).await?)
    }

    // ------------------------------------------------------------------------
    // Engine
    // ------------------------------------------------------------------------

    /// Start a session for every signed-in account with the current comments.
    pub async fn start(&self) -> Result<StartReport, ControlError> {
        if self.engine.is_running().await {
            return Err(ControlError::AlreadyRunning);
        }

        let state = self.registry.snapshot().await?;
        if state.accounts.is_empty() || state.comments.is_empty() {
            return Err(ControlError::NotEnoughAccountsOrComments);
        }
        let accounts = self.registry.signed_in_identities().await?;
        if accounts.is_empty() {
            return Err(ControlError::NoSignedInAccounts);
        }

        Ok(self.engine.start_all(accounts, state.comments).await?)
    }

    pub async fn stop(&self) -> Result<StopReport, ControlError> {
        Ok(self.engine.stop_all().await?)
    }

    pub async fn status(&self) -> Result<EngineStatus, ControlError> {
        Ok(self.engine.status().await?)
    }
}
