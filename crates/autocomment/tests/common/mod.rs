//! Common test utilities.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::connect_info::MockConnectInfo;
use tokio::sync::mpsc;

use autocomment::connector::{
    AccountIdentity, ChatKind, Connected, Connection, ConnectionError, Connector, InboundEvent,
    IncomingPost,
};
use autocomment::control::Controller;
use autocomment::engine::EngineHandle;
use autocomment::server::{self, AppState};
use autocomment::store::AccountRegistry;
use autocomment::store::file::FileStateStore;

// ============================================================================
// Mock Connector
// ============================================================================

/// How the mock service treats one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Connects and reports a valid prior sign-in.
    Authorized,
    /// Connects but the stored credential is not signed in.
    Unauthorized,
    /// Connecting fails with a network error.
    Unreachable,
    /// Connects, but every send fails.
    FailSends,
    /// Connects, and every send takes this long to complete.
    SlowSends(Duration),
    /// Connects, but closing reports an error.
    FailClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentComment {
    pub account: String,
    pub chat_id: i64,
    pub message_id: i64,
    pub content: String,
}

#[derive(Default)]
struct Recorder {
    connects: Vec<String>,
    closed: Vec<String>,
    sent: Vec<SentComment>,
    events: HashMap<String, mpsc::Sender<InboundEvent>>,
}

/// In-memory [`Connector`]. Unknown accounts behave as `Authorized`.
#[derive(Default)]
pub struct MockConnector {
    behaviors: Mutex<HashMap<String, Behavior>>,
    recorder: Arc<Mutex<Recorder>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, account: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(account.to_string(), behavior);
    }

    fn behavior(&self, account: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(account)
            .copied()
            .unwrap_or(Behavior::Authorized)
    }

    pub fn connects(&self) -> Vec<String> {
        self.recorder.lock().unwrap().connects.clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.recorder.lock().unwrap().closed.clone()
    }

    pub fn sent(&self) -> Vec<SentComment> {
        self.recorder.lock().unwrap().sent.clone()
    }

    /// Deliver an inbound event on the account's latest connection.
    ///
    /// Returns `false` when nothing is listening.
    pub async fn deliver(&self, account: &str, event: InboundEvent) -> bool {
        let tx = self.recorder.lock().unwrap().events.get(account).cloned();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Deliver a new post in a chat of `kind`.
    pub async fn post(&self, account: &str, kind: ChatKind, message_id: i64) -> bool {
        self.deliver(account, new_post(kind, message_id)).await
    }

    /// Drop the account's event sender, as if the connection was lost.
    pub fn drop_stream(&self, account: &str) {
        self.recorder.lock().unwrap().events.remove(account);
    }
}

pub fn new_post(kind: ChatKind, message_id: i64) -> InboundEvent {
    InboundEvent::NewMessage(IncomingPost {
        chat_id: -1001,
        chat_kind: kind,
        message_id,
        text: "post".to_string(),
    })
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, identity: &AccountIdentity) -> Result<Connected, ConnectionError> {
        let behavior = self.behavior(&identity.key);
        if behavior == Behavior::Unreachable {
            return Err(ConnectionError::network("connection refused"));
        }

        let (tx, rx) = mpsc::channel(16);
        {
            let mut recorder = self.recorder.lock().unwrap();
            recorder.connects.push(identity.key.clone());
            recorder.events.insert(identity.key.clone(), tx);
        }

        Ok(Connected {
            connection: Arc::new(MockConnection {
                account: identity.key.clone(),
                fail_sends: behavior == Behavior::FailSends,
                fail_close: behavior == Behavior::FailClose,
                send_delay: match behavior {
                    Behavior::SlowSends(delay) => Some(delay),
                    _ => None,
                },
                recorder: self.recorder.clone(),
            }),
            authorized: behavior != Behavior::Unauthorized,
            events: rx,
        })
    }

    async fn request_code(&self, identity: &AccountIdentity) -> Result<String, ConnectionError> {
        match self.behavior(&identity.key) {
            Behavior::Unreachable => Err(ConnectionError::network("connection refused")),
            _ => Ok(format!("hash-{}", identity.key)),
        }
    }

    async fn sign_in(
        &self,
        identity: &AccountIdentity,
        code: &str,
        phone_code_hash: &str,
        password: Option<&str>,
    ) -> Result<bool, ConnectionError> {
        if self.behavior(&identity.key) == Behavior::Unreachable {
            return Err(ConnectionError::network("connection refused"));
        }
        if phone_code_hash != format!("hash-{}", identity.key) || code == "00000" {
            return Err(ConnectionError::AuthRequired(identity.key.clone()));
        }
        if code == "22222" && password.is_none() {
            return Err(ConnectionError::SecondFactorRequired(identity.key.clone()));
        }
        Ok(true)
    }
}

struct MockConnection {
    account: String,
    fail_sends: bool,
    fail_close: bool,
    send_delay: Option<Duration>,
    recorder: Arc<Mutex<Recorder>>,
}

#[async_trait]
impl Connection for MockConnection {
    fn account(&self) -> &str {
        &self.account
    }

    async fn send_comment(
        &self,
        chat_id: i64,
        message_id: i64,
        content: &str,
    ) -> Result<(), ConnectionError> {
        if self.fail_sends {
            return Err(ConnectionError::network("CHAT_WRITE_FORBIDDEN"));
        }
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        self.recorder.lock().unwrap().sent.push(SentComment {
            account: self.account.clone(),
            chat_id,
            message_id,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.recorder
            .lock()
            .unwrap()
            .closed
            .push(self.account.clone());
        if self.fail_close {
            return Err(ConnectionError::network("socket already gone"));
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Signed-in identity with a throwaway credential path.
pub fn identity(key: &str) -> AccountIdentity {
    AccountIdentity::new(key, true, format!("/tmp/{key}.session"))
}

pub fn comments(items: &[&str]) -> Vec<String> {
    items.iter().map(|c| c.to_string()).collect()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_for(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Give the engine loop time to process anything in flight.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// ============================================================================
// App
// ============================================================================

pub struct TestContext {
    pub connector: Arc<MockConnector>,
    pub state: AppState,
}

impl TestContext {
    pub fn registry(&self) -> &AccountRegistry {
        self.state.controller.registry()
    }

    pub fn engine(&self) -> &EngineHandle {
        self.state.controller.engine()
    }

    /// Router that sees every request as coming from loopback.
    pub fn app(&self) -> Router {
        server::build_app(self.state.clone(), 30).layer(MockConnectInfo(SocketAddr::from((
            [127, 0, 0, 1],
            4000,
        ))))
    }

    /// Router that sees every request as coming from a remote address.
    pub fn remote_app(&self) -> Router {
        server::build_app(self.state.clone(), 30).layer(MockConnectInfo(SocketAddr::from((
            [203, 0, 113, 7],
            4000,
        ))))
    }
}

/// Create a test context with an empty registry and a live engine.
pub fn test_context() -> TestContext {
    use tempfile::TempDir;

    let tmp = TempDir::new().unwrap();
    // Leak the TempDir so it doesn't get cleaned up during the test.
    let tmp = Box::leak(Box::new(tmp));

    let connector = MockConnector::new();
    let store = Arc::new(FileStateStore::new(tmp.path().join("state.json")));
    let registry = AccountRegistry::new(store, tmp.path().join("sessions"));
    let engine = EngineHandle::start(connector.clone()).unwrap();

    let (shutdown_tx, _shutdown_rx) = server::shutdown_channel();
    let state = AppState {
        controller: Controller::new(registry, engine),
        log_file: tmp.path().join("autocomment.log"),
        tail_lines: 100,
        api_token: None,
        admin_token: None,
        shutdown_tx: Arc::new(tokio::sync::Mutex::new(Some(shutdown_tx))),
    };

    TestContext { connector, state }
}
