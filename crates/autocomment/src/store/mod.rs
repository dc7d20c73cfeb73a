//! Persistence for accounts and comments.
//!
//! `StateStore` is the storage seam; `file::FileStateStore` keeps everything
//! in one JSON document. `AccountRegistry` layers the account and comment
//! rules on top and serializes read-modify-write cycles.

pub mod error;
pub mod file;
mod registry;
mod state;

pub use error::{StorageError, StorageResult};
pub use registry::{AccountRegistry, RegistryError, validate_account_key};
pub use state::{AccountRecord, RegistryState, StateStore};
