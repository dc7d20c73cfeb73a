//! One account's live connection and its event listener.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use crate::connector::{AccountIdentity, Connection, ConnectionError, Connector, InboundEvent};

/// Errors from session setup.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("listener already registered for account '{0}'")]
    ListenerRegistered(String),

    #[error("session for account '{0}' is closed")]
    Closed(String),
}

impl SessionError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(e) => e.code(),
            Self::ListenerRegistered(_) => "listener_registered",
            Self::Closed(_) => "session_closed",
        }
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, Self::Connection(ConnectionError::AuthRequired(_)))
    }
}

/// A connected, authorized account.
///
/// Must be created and used on the engine loop thread: the listener is
/// spawned with `spawn_local`.
pub struct Session {
    key: String,
    connection: Arc<dyn Connection>,
    events: Option<mpsc::Receiver<InboundEvent>>,
    listener: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    healthy: Rc<Cell<bool>>,
    closed: bool,
}

impl Session {
    /// Connect under the stored credential and verify it is signed in.
    ///
    /// Fails with `AuthRequired` when the registry or the service says the
    /// account is not authorized; the connection is released first.
    pub async fn connect_and_authorize(
        connector: &dyn Connector,
        identity: &AccountIdentity,
    ) -> Result<Self, SessionError> {
        if !identity.authorized {
            return Err(ConnectionError::AuthRequired(identity.key.clone()).into());
        }

        let connected = connector.connect(identity).await?;
        if !connected.authorized {
            if let Err(e) = connected.connection.close().await {
                warn!(account = %identity.key, error = %e, "Failed to close unauthorized connection");
            }
            return Err(ConnectionError::AuthRequired(identity.key.clone()).into());
        }

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            key: identity.key.clone(),
            connection: connected.connection,
            events: Some(connected.events),
            listener: None,
            shutdown_tx,
            healthy: Rc::new(Cell::new(true)),
            closed: false,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// False once the event stream ended without [`close`](Self::close).
    pub fn is_healthy(&self) -> bool {
        self.healthy.get()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Attach `dispatcher` to the inbound event stream. One listener per session.
    ///
    /// Events are dispatched one at a time in arrival order.
    pub fn register_listener(&mut self, dispatcher: Rc<Dispatcher>) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed(self.key.clone()));
        }
        let Some(mut events) = self.events.take() else {
            return Err(SessionError::ListenerRegistered(self.key.clone()));
        };

        let key = self.key.clone();
        let connection = self.connection.clone();
        let healthy = self.healthy.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::task::spawn_local(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else {
                    if !*shutdown_rx.borrow() {
                        healthy.set(false);
                        warn!(account = %key, "Connection lost");
                    }
                    break;
                };
                dispatcher.dispatch(&key, connection.as_ref(), &event).await;
            }
            debug!(account = %key, "Listener stopped");
        });

        self.listener = Some(handle);
        Ok(())
    }

    /// Stop listening and release the connection. Idempotent.
    ///
    /// Teardown always completes. A close error is logged and returned for
    /// reporting only. A send already in flight is not interrupted; close
    /// returns once the listener has finished it.
    pub async fn close(&mut self) -> Result<(), ConnectionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.events = None;
        self.shutdown_tx.send_replace(true);

        let result = self.connection.close().await;

        // Wait for the listener so no event is dispatched after close returns
        if let Some(listener) = self.listener.take()
            && let Err(e) = listener.await
        {
            warn!(account = %self.key, error = %e, "Listener task failed");
        }

        match result {
            Ok(()) => {
                info!(account = %self.key, "Session closed");
                Ok(())
            }
            Err(e) => {
                warn!(account = %self.key, error = %e, "Error closing session");
                Err(e)
            }
        }
    }
}
