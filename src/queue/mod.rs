//! Queue Module
//!
//! Asynchronous work queue between the in-memory store and whatever
//! persists its mutations.
//!
//! ## Responsibilities
//! - FIFO buffering of pending mutations (bounded or unbounded)
//! - Backpressure: a put that fills a bounded queue flushes it
//! - Fixed pool of worker threads feeding a [`Processor`]
//! - Retry with backoff on failure, dead-lettering once retries run out
//! - Clean shutdown of the worker pool
//!
//! ## Ordering
//! Items reach the processor in enqueue order. A failed item rejoins at
//! the *current* tail, so its retry can land after later writes to other
//! keys.
//!
//! ```text
//!  put ──► [ item ][ item ][ item ] ──► worker 0..W ──► Processor
//!              ▲                              │
//!              └──────── requeue on Err ──────┘
//! ```

mod dead_letter;
mod item;
mod processor;
mod retry;
mod work_queue;

pub use dead_letter::{DeadLetter, DeadLetters};
pub use item::{now_millis, QueueItem};
pub use processor::{NoopProcessor, Processor};
pub use retry::RetryPolicy;
pub use work_queue::{QueueStats, WorkQueue};
