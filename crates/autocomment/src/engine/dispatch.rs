//! Inbound event dispatch.

use std::rc::Rc;

use tracing::{error, info, warn};

use super::state::{CommentPool, EngineState};
use crate::connector::{Connection, ConnectionError, InboundEvent};

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a new post in a broadcast channel.
    Ignored,
    /// The engine is not enabled.
    Disabled,
    /// Nothing to send.
    EmptyPool,
    Sent {
        comment: String,
    },
    Failed {
        comment: String,
        error: ConnectionError,
    },
}

/// Event handler shared by all sessions of one start generation.
pub struct Dispatcher {
    state: Rc<EngineState>,
    pool: CommentPool,
}

impl Dispatcher {
    pub fn new(state: Rc<EngineState>, pool: CommentPool) -> Self {
        Self { state, pool }
    }

    pub fn pool(&self) -> &CommentPool {
        &self.pool
    }

    /// Evaluate one event received by `account` and reply through `connection`.
    ///
    /// Send failures are logged and returned, never propagated.
    pub async fn dispatch(
        &self,
        account: &str,
        connection: &dyn Connection,
        event: &InboundEvent,
    ) -> DispatchOutcome {
        let InboundEvent::NewMessage(post) = event else {
            return DispatchOutcome::Ignored;
        };
        if !post.chat_kind.is_broadcast() {
            return DispatchOutcome::Ignored;
        }
        if !self.state.is_enabled() {
            return DispatchOutcome::Disabled;
        }

        let Some(comment) = self.pool.pick(&mut rand::rng()).map(str::to_string) else {
            warn!(account = %account, chat_id = post.chat_id, "Comment pool is empty");
            return DispatchOutcome::EmptyPool;
        };

        match connection
            .send_comment(post.chat_id, post.message_id, &comment)
            .await
        {
            Ok(()) => {
                info!(
                    account = %account,
                    chat_id = post.chat_id,
                    comment = %comment,
                    "Comment sent"
                );
                DispatchOutcome::Sent { comment }
            }
            Err(e) => {
                error!(
                    account = %account,
                    chat_id = post.chat_id,
                    comment = %comment,
                    error = %e,
                    "Failed to send comment"
                );
                DispatchOutcome::Failed { comment, error: e }
            }
        }
    }
}
