//! # LeakKV
//!
//! An embedded write-behind key-value store:
//! - Reads and writes served from memory (read-your-writes)
//! - Mutations mirrored asynchronously to a durable backend
//! - Bounded work queue with backpressure and a worker pool
//! - Retry with backoff and a dead-letter list, never a silent drop
//! - Optional TCP publish/subscribe transport for mutation records
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Caller / Subscriber (TCP records)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ set / incr / decr / delete
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     MemoryStore                              │
//! │        (RwLock map, write-order lock, MutationHook)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ QueueHook::put
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      WorkQueue                               │
//! │     (FIFO, capacity + flush, W workers, retry / requeue)     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ BackendProcessor::process
//!                       ▼
//!                ┌─────────────┐
//!                │   Backend   │
//!                │ (log file)  │
//!                └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod queue;
pub mod backend;
pub mod write_behind;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LeakError, Result};
pub use config::{Config, SyncStrategy};
pub use store::{MemoryStore, Mutation, MutationHook, Value};
pub use queue::{Processor, QueueItem, RetryPolicy, WorkQueue};
pub use backend::{Backend, FileBackend, MemoryBackend};
pub use write_behind::WriteBehindStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LeakKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
