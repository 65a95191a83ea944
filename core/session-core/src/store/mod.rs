//! Persisted key-value storage and the readers built on it.
//!
//! # Module Structure
//!
//! - [`memory`]: In-process store for tests and ephemeral clients
//! - [`file`]: JSON file store (`~/.membership/store.json`)
//! - [`session_reader`]: Finds and validates a stored session snapshot
//! - [`profile_cache`]: Last-known-good profile/organization per user
//!
//! The store is the only shared mutable resource outside in-memory state.
//! Writes are last-writer-wins.

mod file;
mod memory;
mod profile_cache;
mod session_reader;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use profile_cache::{CachedProfile, ProfileCache};
pub use session_reader::{clear_stored_sessions, read_stored_session};

use crate::error::Result;

/// Local persistent key-value storage.
///
/// Reads never fail: a value that can't be read is absent.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Removes every entry, including ones this crate did not write.
    fn clear_all(&self) -> Result<()>;

    fn keys(&self) -> Vec<String>;
}
