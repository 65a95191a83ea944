//! # session-core
//!
//! Session and profile synchronization core for the membership platform.
//! Decides, within bounded time, whether a visitor is signed in and whose
//! profile is on screen, and recovers when that answer is late or wrong.
//!
//! ## Design Principles
//!
//! - **Bounded**: Every remote call runs under a soft timeout; a failsafe
//!   timer guarantees the session determination always ends.
//! - **Local-first**: Stored sessions and cached profiles are shown before
//!   the network answers, and never regressed by a later failure.
//! - **Generation-checked**: Results are applied only if no newer fetch has
//!   started. "Cancel" means "ignore the result".
//! - **Graceful degradation**: Missing or malformed persisted data reads as
//!   absent, not as an error.
//! - **Injected collaborators**: Backend, store, clock and navigation are
//!   traits, so tests drive everything with fakes on a paused clock.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use session_core::{Collaborators, SessionCore, SyncConfig};
//!
//! let core = SessionCore::new(collaborators, SyncConfig::default());
//! core.start();
//! let snapshot = core.snapshot();
//! if snapshot.session_timed_out {
//!     core.retry_auth();
//! }
//! ```

pub mod backend;
pub mod bounded;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod profile;
pub mod retry;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;

pub use backend::{AuthBackend, AuthSubscription, Clock, Navigator, ProfileBackend, SystemClock};
pub use bounded::{with_timeout, Bounded};
pub use config::SyncConfig;
pub use engine::{Collaborators, CoreSnapshot, CoreUpdates, SessionCore};
pub use error::{DataError, DataErrorKind, Result, SyncError};
pub use generation::{Generation, GenerationTracker};
pub use profile::{FetchStatus, ProfileSnapshot, ProfileSync};
pub use retry::RetryScheduler;
pub use session::{ReadySource, SessionLifecycle, SessionPhase, SessionSnapshot};
pub use storage::StorageConfig;
pub use store::{
    clear_stored_sessions, read_stored_session, CachedProfile, FileStore, KeyValueStore,
    MemoryStore, ProfileCache,
};
pub use types::*;
