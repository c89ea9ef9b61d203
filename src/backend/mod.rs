//! Backend Module
//!
//! Durable key-value adapters the write-behind queue drains into.
//!
//! ## Responsibilities
//! - Persist `Set`/`Delete` mutations synchronously on `apply`
//! - Hand back everything persisted so a reopened store starts primed
//! - Flush to stable storage on `sync`/`close`
//!
//! ## Log File Format ([`FileBackend`])
//! ```text
//! ┌───────────────────────────────────────────┐
//! │ Record 1                                  │
//! │ ┌─────────┬─────────┬───────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ bincode(Mutation) │ │
//! │ └─────────┴─────────┴───────────────────┘ │
//! ├───────────────────────────────────────────┤
//! │ Record 2 ...                              │
//! └───────────────────────────────────────────┘
//! ```
//! A torn record at the tail is truncated on open. `close` compacts the log
//! to one `Set` record per live key.

mod file;
mod memory;

pub use file::{FileBackend, LogRecovery, RECORD_HEADER_SIZE};
pub use memory::MemoryBackend;

use crate::error::Result;
use crate::store::{Mutation, Value};

/// A durable key-value store behind the write-behind queue
///
/// Implementations must be safe to call from several queue workers at
/// once.
pub trait Backend: Send + Sync {
    /// Every persisted entry, used to prime memory on open
    fn load(&self) -> Result<Vec<(String, Value)>>;

    /// Persist one mutation. `Ok` is the only success signal.
    fn apply(&self, mutation: &Mutation) -> Result<()>;

    /// Flush buffered writes to stable storage
    fn sync(&self) -> Result<()>;

    /// Sync and release the handle. Later `apply` calls fail.
    fn close(&self) -> Result<()>;
}
