//! Queue item definitions

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::store::Mutation;

/// A pending mutation waiting to be processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// The mutation to persist; never changes once enqueued
    pub mutation: Mutation,

    /// Timestamp (unix millis) when the mutation was enqueued
    pub enqueued_at: u64,

    /// Number of failed processing attempts so far
    pub attempts: u32,

    /// Position in enqueue order, assigned by the queue (0 = not yet queued)
    ///
    /// Kept across requeues, so a processor can tell a stale retry from a
    /// newer write to the same key.
    pub seq: u64,
}

impl QueueItem {
    pub fn new(mutation: Mutation, enqueued_at: u64) -> Self {
        Self {
            mutation,
            enqueued_at,
            attempts: 0,
            seq: 0,
        }
    }
}

/// Current time as unix milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
