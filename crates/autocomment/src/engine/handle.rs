//! Thread-safe facade over the engine loop.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::supervisor::{EngineStatus, StartReport, StopReport, Supervisor};
use crate::connector::{AccountIdentity, ConnectionError, Connector};
use crate::runner::{LoopRunner, RunnerError};

/// Name of the dedicated engine thread.
pub const LOOP_THREAD_NAME: &str = "engine-loop";

/// Errors surfaced by [`EngineHandle`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Cloneable handle to the engine. Every call runs on the engine loop.
#[derive(Clone)]
pub struct EngineHandle {
    runner: Arc<LoopRunner<Supervisor>>,
}

impl EngineHandle {
    /// Start the engine loop with a stopped supervisor.
    pub fn start(connector: Arc<dyn Connector>) -> Result<Self, EngineError> {
        let runner = Arc::new(LoopRunner::new(LOOP_THREAD_NAME));
        runner.start(move || Supervisor::new(connector))?;
        Ok(Self { runner })
    }

    // ------------------------------------------------------------------------
    // Account Handshake
    // ------------------------------------------------------------------------

    /// Ask the service to send a verification code. Returns the opaque hash.
    pub async fn request_verification_code(
        &self,
        identity: AccountIdentity,
    ) -> Result<String, EngineError> {
        let hash = self
            .runner
            .call(move |sup| Box::pin(async move { sup.request_code(&identity).await }))
            .await??;
        Ok(hash)
    }

    /// Complete sign-in with the code and the hash from
    /// [`request_verification_code`](Self::request_verification_code).
    pub async fn confirm_account(
        &self,
        identity: AccountIdentity,
        code: String,
        phone_code_hash: String,
        password: Option<String>,
    ) -> Result<bool, EngineError> {
        let authorized = self
            .runner
            .call(move |sup| {
                Box::pin(async move {
                    sup.sign_in(&identity, &code, &phone_code_hash, password.as_deref())
                        .await
                })
            })
            .await??;
        Ok(authorized)
    }

    // ------------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------------

    pub async fn start_all(
        &self,
        accounts: Vec<AccountIdentity>,
        comments: Vec<String>,
    ) -> Result<StartReport, EngineError> {
        Ok(self
            .runner
            .call(move |sup| Box::pin(sup.start_all(accounts, comments)))
            .await?)
    }

    pub async fn stop_one(&self, key: &str) -> Result<bool, EngineError> {
        let key = key.to_string();
        Ok(self
            .runner
            .call(move |sup| Box::pin(async move { sup.stop_one(&key).await }))
            .await?)
    }

    pub async fn stop_all(&self) -> Result<StopReport, EngineError> {
        Ok(self
            .runner
            .call(|sup| Box::pin(sup.stop_all()))
            .await?)
    }

    // ------------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------------

    /// Whether the engine is enabled. A stopped loop reads as not running.
    pub async fn is_running(&self) -> bool {
        self.runner
            .call(|sup| Box::pin(async move { sup.is_running() }))
            .await
            .unwrap_or(false)
    }

    /// Whether the loop thread is still alive. Does not wait on the loop.
    pub fn is_loop_alive(&self) -> bool {
        self.runner.is_running()
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        Ok(self
            .runner
            .call(|sup| Box::pin(async move { sup.status() }))
            .await?)
    }

    /// Close every session, then stop the loop.
    pub async fn shutdown(&self) {
        let runner = self.runner.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let report = runner.submit(|sup| Box::pin(sup.stop_all()));
            runner.stop();
            report
        })
        .await;

        match joined {
            Ok(Ok(report)) => info!(closed = report.closed.len(), "Engine shut down"),
            Ok(Err(RunnerError::Stopped)) => {}
            Ok(Err(e)) => warn!(error = %e, "Engine shutdown failed"),
            Err(e) => warn!(error = %e, "Engine shutdown task failed"),
        }
    }
}
