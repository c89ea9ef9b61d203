//! Write-Behind Module
//!
//! Wires the in-memory store, the work queue and a durable backend into one
//! store.
//!
//! ## Wiring
//! ```text
//!   caller ──► MemoryStore ──hook──► WorkQueue ──worker──► BackendProcessor ──► Backend
//!               (sync, RAM)          (FIFO + retry)                            (durable)
//! ```
//!
//! - Writes return as soon as memory is updated and the mutation is queued
//! - Backend failures never reach the caller; they drive the retry path
//! - `close` drains the queue *before* the backend is closed

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{Backend, FileBackend};
use crate::config::Config;
use crate::error::Result;
use crate::queue::{now_millis, Processor, QueueItem, WorkQueue};
use crate::store::{MemoryStore, Mutation, MutationHook};

/// Hook that forwards every mutation to a work queue
pub struct QueueHook {
    queue: Arc<WorkQueue>,
}

impl QueueHook {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }
}

impl MutationHook for QueueHook {
    fn on_mutation(&self, mutation: Mutation) -> Result<()> {
        self.queue.put(mutation, Some(now_millis()))
    }
}

/// Processor that applies queued mutations to a backend
///
/// The enqueue timestamp is dropped; only the mutation reaches the backend.
///
/// ## Per-key Ordering
/// Several workers may hold writes to the same key at once. The last
/// applied `seq` of every key is tracked, and an item older than it is
/// acknowledged without being applied, so the backend always ends on the
/// newest write of each key. The check and the apply share one lock.
pub struct BackendProcessor {
    backend: Arc<dyn Backend>,

    /// Key → seq of the last mutation applied to the backend
    applied: Mutex<HashMap<String, u64>>,
}

impl BackendProcessor {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            applied: Mutex::new(HashMap::new()),
        }
    }
}

impl Processor for BackendProcessor {
    fn process(&self, item: &QueueItem) -> Result<()> {
        let key = item.mutation.key();
        let mut applied = self.applied.lock();

        if let Some(&last) = applied.get(key) {
            if item.seq <= last {
                tracing::debug!(key = %key, seq = item.seq, last, "skip stale item");
                return Ok(());
            }
        }

        self.backend.apply(&item.mutation)?;
        applied.insert(key.to_string(), item.seq);
        Ok(())
    }
}

/// In-memory store whose mutations are persisted asynchronously
///
/// Dereferences to [`MemoryStore`] for every read and write operation.
pub struct WriteBehindStore {
    memory: MemoryStore,
    queue: Arc<WorkQueue>,

    /// None for the queue-only variant
    backend: Option<Arc<dyn Backend>>,

    closed: AtomicBool,
}

impl WriteBehindStore {
    /// Open a store backed by the log file at `config.data_path`
    ///
    /// Everything already persisted there is visible immediately.
    pub fn open(config: &Config) -> Result<Self> {
        let backend = FileBackend::open(&config.data_path, config.sync_strategy)?;
        Self::new(config, Arc::new(backend))
    }

    /// Compose a store over any backend, priming memory from it
    pub fn new(config: &Config, backend: Arc<dyn Backend>) -> Result<Self> {
        let processor = Arc::new(BackendProcessor::new(Arc::clone(&backend)));
        let store = Self::build(config, processor, Some(backend))?;

        if let Some(backend) = &store.backend {
            let primed = store.memory.prime(backend.load()?);
            tracing::info!(parent: store.memory.span(), "primed {} entries from backend", primed);
        }

        Ok(store)
    }

    /// Queue-only variant: mutations are handed to `processor`, no backend
    pub fn with_processor(config: &Config, processor: Arc<dyn Processor>) -> Result<Self> {
        Self::build(config, processor, None)
    }

    fn build(
        config: &Config,
        processor: Arc<dyn Processor>,
        backend: Option<Arc<dyn Backend>>,
    ) -> Result<Self> {
        let queue = Arc::new(WorkQueue::new(config, processor)?);
        let memory = MemoryStore::named(&config.name);
        memory.set_hook(Arc::new(QueueHook::new(Arc::clone(&queue))));

        Ok(Self {
            memory,
            queue,
            backend,
            closed: AtomicBool::new(false),
        })
    }

    /// Drain the queue, stop the workers, then close the backend
    ///
    /// The order matters: closing the backend first would lose queued
    /// writes. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let span = self.memory.span();
        tracing::info!(parent: span, "closing: draining {} pending items", self.queue.unfinished());

        self.queue.flush(true);
        self.queue.shutdown();
        self.memory.close();

        let dead = self.queue.dead_letters().len();
        if dead > 0 {
            tracing::warn!(parent: span, "closing with {} dead-lettered items never persisted", dead);
        }

        if let Some(backend) = &self.backend {
            backend.sync()?;
            backend.close()?;
        }

        tracing::info!(parent: span, "closed");
        Ok(())
    }

    /// Wait until every queued mutation has been processed
    pub fn flush(&self) -> bool {
        self.queue.flush(true)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn backend(&self) -> Option<&Arc<dyn Backend>> {
        self.backend.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Deref for WriteBehindStore {
    type Target = MemoryStore;

    fn deref(&self) -> &MemoryStore {
        &self.memory
    }
}

impl Drop for WriteBehindStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(parent: self.memory.span(), "failed to close store: {}", e);
        }
    }
}

impl fmt::Display for WriteBehindStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :: {}", self.memory, self.queue)
    }
}
