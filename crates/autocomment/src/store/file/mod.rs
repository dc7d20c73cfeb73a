//! File-based storage implementations.
//!
//! All writes use atomic operations (temp file + rename) to prevent corruption.

mod state;

pub use state::FileStateStore;
