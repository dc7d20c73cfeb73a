//! Gateway protocol types for communication between autocomment and account gateways.
//!
//! A gateway is an external process that owns exactly one user account's
//! messaging client. autocomment spawns one gateway per account and talks to it
//! with JSON Lines (newline-delimited JSON) over stdio:
//!
//! - **Commands** (autocomment → gateway): requests written to the gateway's stdin
//! - **Events** (gateway → autocomment): replies and notifications on its stdout
//!
//! Every command that expects an answer carries a `request_id`; the gateway
//! echoes it back in the matching `command_ok`, `command_error`, `code_sent`
//! or `signed_in` event.
//!
//! # Example: Minimal Gateway
//!
//! ```ignore
//! use autocomment_gateway_protocol::{GatewayCommand, GatewayEvent};
//!
//! // Announce readiness first
//! let event = GatewayEvent::Ready {
//!     account: "+15550100".to_string(),
//!     version: "1.0.0".to_string(),
//!     authorized: true,
//! };
//! println!("{}", serde_json::to_string(&event)?);
//!
//! // Then read commands from stdin
//! let line = read_line_from_stdin();
//! let command: GatewayCommand = serde_json::from_str(&line)?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Commands (autocomment → Gateway)
// ============================================================================

/// Commands sent from autocomment to a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Ask the messaging service to send a verification code to the account.
    RequestCode { request_id: String, phone: String },

    /// Complete sign-in with a received verification code.
    SignIn {
        request_id: String,
        phone: String,
        code: String,
        phone_code_hash: String,
        /// Second-factor password, when the account has one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },

    /// Post a comment in the discussion thread of a channel post.
    SendComment {
        request_id: String,
        chat_id: i64,
        message_id: i64,
        content: String,
    },

    /// Request graceful shutdown.
    Shutdown,
}

impl GatewayCommand {
    /// Request id carried by this command, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::RequestCode { request_id, .. }
            | Self::SignIn { request_id, .. }
            | Self::SendComment { request_id, .. } => Some(request_id),
            Self::Shutdown => None,
        }
    }
}

// ============================================================================
// Events (Gateway → autocomment)
// ============================================================================

/// Events sent from a gateway to autocomment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Gateway connected and is ready to receive commands.
    Ready {
        account: String,
        version: String,
        /// Whether the stored session is already signed in.
        #[serde(default)]
        authorized: bool,
    },

    /// A new message was posted in a chat the account can see.
    NewMessage(Box<MessageData>),

    /// An existing message was edited.
    MessageEdited(Box<MessageData>),

    /// Verification code was sent.
    CodeSent {
        request_id: String,
        phone_code_hash: String,
    },

    /// Sign-in completed (or the account was already signed in).
    SignedIn { request_id: String },

    /// Command completed successfully.
    CommandOk {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<i64>,
    },

    /// Command failed.
    CommandError {
        request_id: String,
        code: String,
        message: String,
    },

    /// Gateway-level error (not tied to a specific command).
    Error {
        code: String,
        message: String,
        /// Whether this error is fatal (gateway will shut down).
        #[serde(default)]
        fatal: bool,
    },

    /// Gateway is shutting down.
    Shutdown { reason: String },
}

impl GatewayEvent {
    /// Request id this event answers, if it is a reply.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::CodeSent { request_id, .. }
            | Self::SignedIn { request_id }
            | Self::CommandOk { request_id, .. }
            | Self::CommandError { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

/// A message observed by a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub chat: Chat,
    pub message_id: i64,
    #[serde(default)]
    pub text: String,
    /// Timestamp when the message was sent (from the platform).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

/// The chat a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub kind: ChatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Kind of chat a message was posted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// One-to-one conversation.
    Private,
    /// Small group where every member may post.
    Group,
    /// Channel-backed supergroup where every member may post.
    Megagroup,
    /// Publish-only channel.
    Broadcast,
}

impl ChatKind {
    /// Whether only admins can post here.
    pub fn is_broadcast(self) -> bool {
        matches!(self, Self::Broadcast)
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Well-known `code` values used in `command_error` and `error` events.
pub mod codes {
    /// The stored session is not signed in.
    pub const AUTH_REQUIRED: &str = "auth_required";
    /// The verification code was wrong or expired.
    pub const INVALID_CODE: &str = "invalid_code";
    /// The account has a second-factor password and none was supplied.
    pub const PASSWORD_REQUIRED: &str = "password_required";
    /// The supplied second-factor password was wrong.
    pub const INVALID_PASSWORD: &str = "invalid_password";
    /// The service asked the client to slow down.
    pub const FLOOD_WAIT: &str = "flood_wait";
    /// Sending the comment failed.
    pub const SEND_FAILED: &str = "send_failed";
    /// Connecting to the messaging service failed.
    pub const CONNECT_FAILED: &str = "connect_failed";
    /// The command could not be parsed or is not supported.
    pub const INVALID_COMMAND: &str = "invalid_command";
}

// ============================================================================
// Tests
// ============================================================================
