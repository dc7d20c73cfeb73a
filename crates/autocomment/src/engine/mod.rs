//! Multi-account commenting engine.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  call()   ┌───────────────────────── engine-loop thread ─┐
//!  │ EngineHandle │──────────▶│ LoopRunner ──jobs──▶ Supervisor               │
//!  │  (cloneable) │◀──reply───│                      │ owns EngineState      │
//!  └──────────────┘           │                      │ owns Vec<Session>     │
//!                             │                      ▼                       │
//!                             │   Session ──spawn_local──▶ listener task     │
//!                             │                            │ Dispatcher      │
//!                             │                            ▼                 │
//!                             │                     Connection::send_comment │
//!                             └──────────────────────────────────────────────┘
//! ```
//!
//! - **Supervisor** owns the live sessions and the `enabled` flag. Control jobs
//!   (start all, stop one, stop all) run one at a time on the loop thread.
//! - **Session** wraps one account's connection and its single listener task.
//! - **Dispatcher** is shared by every session of one start generation. It
//!   holds the engine state and the comment pool snapshot taken at start.
//! - **EngineHandle** is the only way in from other threads.
//!
//! Engine state uses `Rc`/`Cell` and is therefore pinned to the loop thread
//! by the type system.

mod dispatch;
mod handle;
mod session;
mod state;
mod supervisor;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use handle::{EngineError, EngineHandle, LOOP_THREAD_NAME};
pub use session::{Session, SessionError};
pub use state::{CommentPool, EngineState};
pub use supervisor::{
    CloseFailure, EngineStatus, Phase, SessionStatus, StartFailure, StartReport, StopReport,
    Supervisor,
};
