//! Session supervisor: owns live sessions and the global `enabled` flag.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::dispatch::Dispatcher;
use super::session::{Session, SessionError};
use super::state::{CommentPool, EngineState};
use crate::connector::{AccountIdentity, ConnectionError, Connector};

// ============================================================================
// Reports
// ============================================================================

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Stopped,
    Starting,
    Running,
}

/// An account that could not be started.
#[derive(Debug)]
pub struct StartFailure {
    pub account: String,
    pub error: SessionError,
}

/// Result of [`Supervisor::start_all`].
#[derive(Debug, Default)]
pub struct StartReport {
    /// Accounts with a live session, in start order.
    pub started: Vec<String>,
    pub errors: Vec<StartFailure>,
}

impl StartReport {
    pub fn started_count(&self) -> usize {
        self.started.len()
    }
}

/// A session whose connection did not close cleanly.
#[derive(Debug)]
pub struct CloseFailure {
    pub account: String,
    pub error: ConnectionError,
}

/// Result of [`Supervisor::stop_all`].
#[derive(Debug, Default)]
pub struct StopReport {
    pub closed: Vec<String>,
    pub errors: Vec<CloseFailure>,
}

/// Read-only view of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub phase: Phase,
    pub enabled: bool,
    pub sessions: Vec<SessionStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub account: String,
    pub healthy: bool,
}

// ============================================================================
// Supervisor
// ============================================================================

/// Owns the live session set. Lives on the engine loop thread.
pub struct Supervisor {
    connector: Arc<dyn Connector>,
    state: Rc<EngineState>,
    sessions: Vec<Session>,
    phase: Phase,
}

impl Supervisor {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: Rc::new(EngineState::new()),
            sessions: Vec::new(),
            phase: Phase::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_keys(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.key().to_string()).collect()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            phase: self.phase,
            enabled: self.state.is_enabled(),
            sessions: self
                .sessions
                .iter()
                .map(|s| SessionStatus {
                    account: s.key().to_string(),
                    healthy: s.is_healthy(),
                })
                .collect(),
        }
    }

    /// Replace any running generation with sessions for `accounts`.
    ///
    /// Accounts are connected one at a time. A failing account is recorded and
    /// skipped. The engine is enabled iff at least one session started.
    pub async fn start_all(
        &mut self,
        accounts: Vec<AccountIdentity>,
        comments: Vec<String>,
    ) -> StartReport {
        self.stop_all().await;
        self.phase = Phase::Starting;

        let pool = CommentPool::snapshot(comments);
        info!(
            accounts = accounts.len(),
            comments = pool.len(),
            "Starting sessions"
        );
        let dispatcher = Rc::new(Dispatcher::new(self.state.clone(), pool));

        let mut report = StartReport::default();
        let mut seen = HashSet::new();

        for identity in accounts {
            if !seen.insert(identity.key.clone()) {
                warn!(account = %identity.key, "Duplicate account skipped");
                continue;
            }

            let mut session =
                match Session::connect_and_authorize(self.connector.as_ref(), &identity).await {
                    Ok(session) => session,
                    Err(e) => {
                        if e.is_auth_required() {
                            error!(account = %identity.key, "Account is not authorized, skipping");
                        } else {
                            error!(account = %identity.key, error = %e, "Failed to start session");
                        }
                        report.errors.push(StartFailure {
                            account: identity.key,
                            error: e,
                        });
                        continue;
                    }
                };

            if let Err(e) = session.register_listener(dispatcher.clone()) {
                error!(account = %identity.key, error = %e, "Failed to register listener");
                if let Err(e) = session.close().await {
                    debug!(account = %identity.key, error = %e, "Session closed with error");
                }
                report.errors.push(StartFailure {
                    account: identity.key,
                    error: e,
                });
                continue;
            }

            info!(account = %identity.key, "Session started");
            report.started.push(identity.key);
            self.sessions.push(session);
        }

        let enabled = !self.sessions.is_empty();
        self.state.set_enabled(enabled);
        if enabled {
            self.phase = Phase::Running;
            info!(count = self.sessions.len(), "Started {} sessions", self.sessions.len());
        } else {
            self.phase = Phase::Stopped;
            warn!("No sessions were started");
        }

        report
    }

    /// Close and remove one account's session. Returns whether it was live.
    ///
    /// Leaves `enabled` untouched even when the last session goes away.
    pub async fn stop_one(&mut self, key: &str) -> bool {
        let Some(index) = self.sessions.iter().position(|s| s.key() == key) else {
            return false;
        };
        let mut session = self.sessions.remove(index);
        if let Err(e) = session.close().await {
            debug!(account = %key, error = %e, "Session closed with error");
        }
        info!(account = %key, "Session stopped");
        true
    }

    /// Disable the engine and close every session. Idempotent.
    pub async fn stop_all(&mut self) -> StopReport {
        self.state.set_enabled(false);

        let mut report = StopReport::default();
        for mut session in self.sessions.drain(..) {
            let account = session.key().to_string();
            if let Err(error) = session.close().await {
                report.errors.push(CloseFailure {
                    account: account.clone(),
                    error,
                });
            }
            report.closed.push(account);
        }

        if self.phase != Phase::Stopped || !report.closed.is_empty() {
            info!(closed = report.closed.len(), "Stopped all sessions");
        }
        self.phase = Phase::Stopped;
        report
    }

    /// Request a verification code for an account that is not signed in yet.
    pub async fn request_code(&self, identity: &AccountIdentity) -> Result<String, ConnectionError> {
        self.connector.request_code(identity).await
    }

    /// Complete sign-in for an account.
    pub async fn sign_in(
        &self,
        identity: &AccountIdentity,
        code: &str,
        phone_code_hash: &str,
        password: Option<&str>,
    ) -> Result<bool, ConnectionError> {
        self.connector
            .sign_in(identity, code, phone_code_hash, password)
            .await
    }
}
