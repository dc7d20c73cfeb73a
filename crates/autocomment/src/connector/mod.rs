//! Connection layer between the engine and the messaging service.
//!
//! The engine never talks to the network directly. It opens per-account
//! connections through a [`Connector`] and receives inbound events on the
//! channel returned with each connection. [`GatewayConnector`] is the
//! production implementation; tests plug in their own.

mod subprocess;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use autocomment_gateway_protocol::ChatKind;
pub use subprocess::{GatewayConnector, GatewaySettings};

// ============================================================================
// Account Identity
// ============================================================================

/// What the engine knows about an account before connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    /// Phone-number-like account key.
    pub key: String,
    /// Whether the registry believes this account completed sign-in.
    pub authorized: bool,
    /// Opaque credential reference (session file) owned by the connection layer.
    pub credential: PathBuf,
}

impl AccountIdentity {
    pub fn new(key: impl Into<String>, authorized: bool, credential: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            authorized,
            credential: credential.into(),
        }
    }
}

// ============================================================================
// Inbound Events
// ============================================================================

/// Event delivered by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    NewMessage(IncomingPost),
    MessageEdited(IncomingPost),
}

/// A post observed in some chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingPost {
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub message_id: i64,
    pub text: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Failures reported by the connection layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Account has no valid prior authorization.
    #[error("account '{0}' is not authorized")]
    AuthRequired(String),

    /// Sign-in needs a second-factor password that was not supplied.
    #[error("account '{0}' requires a second-factor password")]
    SecondFactorRequired(String),

    /// Transient network, connect or send failure.
    #[error("network error: {0}")]
    Network(String),

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

impl ConnectionError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthRequired(_) => "auth_required",
            Self::SecondFactorRequired(_) => "second_factor_required",
            Self::Network(_) => "network_error",
            Self::Closed => "connection_closed",
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A freshly opened connection and its event stream.
pub struct Connected {
    pub connection: Arc<dyn Connection>,
    /// Whether the service considers the stored credential signed in.
    pub authorized: bool,
    /// Inbound events; the stream ends when the connection goes away.
    pub events: mpsc::Receiver<InboundEvent>,
}

/// Opens connections and performs the out-of-band sign-in handshake.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection under the account's stored credential.
    async fn connect(&self, identity: &AccountIdentity) -> Result<Connected, ConnectionError>;

    /// Ask the service to send a verification code. Returns the opaque code hash.
    async fn request_code(&self, identity: &AccountIdentity) -> Result<String, ConnectionError>;

    /// Complete sign-in. Returns `true` once the credential is authorized.
    async fn sign_in(
        &self,
        identity: &AccountIdentity,
        code: &str,
        phone_code_hash: &str,
        password: Option<&str>,
    ) -> Result<bool, ConnectionError>;
}

/// One account's live connection.
#[async_trait]
pub trait Connection: Send + Sync {
    fn account(&self) -> &str;

    /// Post `content` as a threaded comment under `message_id` in `chat_id`.
    async fn send_comment(
        &self,
        chat_id: i64,
        message_id: i64,
        content: &str,
    ) -> Result<(), ConnectionError>;

    /// Release the connection. Closing twice is not an error.
    async fn close(&self) -> Result<(), ConnectionError>;
}
