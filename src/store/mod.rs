//! Store Module
//!
//! The in-memory key-value map every other component hangs off.
//!
//! ## Responsibilities
//! - Scalar, multi-key and counter operations on a shared map
//! - Read-your-writes: memory is updated before anything downstream sees
//!   the mutation
//! - Report every successful mutation to a [`MutationHook`]
//!
//! ## Concurrency
//! Readers take the map's read lock only. Writers are serialized by a
//! store-wide write-order lock, which makes `incr`/`decr` atomic and keeps
//! hook calls in memory-write order.

mod hook;
mod memory;
mod value;

use serde::{Deserialize, Serialize};

pub use hook::{MutationHook, NoopHook};
pub use memory::MemoryStore;
pub use value::Value;

/// A mutation applied to memory and forwarded downstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Store a value under a key
    Set { key: String, value: Value },

    /// Remove a key
    Delete { key: String },
}

impl Mutation {
    /// The key this mutation touches
    pub fn key(&self) -> &str {
        match self {
            Mutation::Set { key, .. } => key,
            Mutation::Delete { key } => key,
        }
    }

    /// Lowercase operation name ("set" or "delete")
    pub fn operation(&self) -> &'static str {
        match self {
            Mutation::Set { .. } => "set",
            Mutation::Delete { .. } => "delete",
        }
    }
}
