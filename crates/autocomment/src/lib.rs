//! Multi-account auto-commenter.
//!
//! Watches broadcast channels through every signed-in account and replies to
//! each new post with a comment drawn from a shared pool.

pub mod api;
pub mod config;
pub mod connector;
pub mod control;
pub mod engine;
pub mod handlers;
pub mod logging;
pub mod runner;
pub mod server;
pub mod store;
