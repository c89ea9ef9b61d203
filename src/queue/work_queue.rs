//! Work queue implementation
//!
//! FIFO channel of pending items plus a fixed pool of worker threads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};

use crate::config::Config;
use crate::error::{LeakError, Result};
use crate::store::Mutation;

use super::{now_millis, DeadLetter, DeadLetters, Processor, QueueItem, RetryPolicy};

/// Floor for the idle wait so an idle worker never spins
const MIN_IDLE_WAIT: Duration = Duration::from_millis(1);

/// Bounded (or unbounded) queue of pending mutations with a worker pool
///
/// ## Counters
/// - `queued`: items sitting in the channel
/// - `unfinished`: queued + in-flight items. Capacity applies to this
///   count, so an item holds its slot until it is processed or
///   dead-lettered. `flush` waits for it to reach 0.
///
/// Both are kept under `state` and updated in the same critical section as
/// the channel send, so they never disagree with the channel order. The
/// same critical section hands out each item's `seq`.
///
/// ## Shutdown
/// Every worker selects on a shutdown channel whose only sender is held by
/// the queue. Dropping that sender wakes all workers at once.
pub struct WorkQueue {
    shared: Arc<Shared>,

    /// Dropped to signal shutdown
    shutdown_tx: Mutex<Option<Sender<()>>>,

    /// Worker threads, joined on shutdown
    workers: Mutex<Vec<JoinHandle<()>>>,

    worker_count: usize,
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub processed: u64,
    pub failed: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
}

struct QueueState {
    queued: usize,
    unfinished: usize,
    closed: bool,
    /// Sequence number for the next new item
    next_seq: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
}

/// State shared between the queue handle and its workers
struct Shared {
    capacity: usize,
    retry: RetryPolicy,
    idle_wait: Duration,
    items_tx: Sender<QueueItem>,
    items_rx: Receiver<QueueItem>,
    state: Mutex<QueueState>,
    /// Signaled when `unfinished` drops
    room: Condvar,
    /// Signaled when `unfinished` reaches 0 or the queue closes
    drained: Condvar,
    processor: Arc<dyn Processor>,
    dead_letters: DeadLetters,
    counters: Counters,
    span: tracing::Span,
}

impl WorkQueue {
    /// Create a queue and start its worker pool
    pub fn new(config: &Config, processor: Arc<dyn Processor>) -> Result<Self> {
        config.validate()?;

        let (items_tx, items_rx) = channel::unbounded();
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        let shared = Arc::new(Shared {
            capacity: config.queue_capacity,
            retry: config.retry,
            idle_wait: config.idle_wait().max(MIN_IDLE_WAIT),
            items_tx,
            items_rx,
            state: Mutex::new(QueueState {
                queued: 0,
                unfinished: 0,
                closed: false,
                next_seq: 1,
            }),
            room: Condvar::new(),
            drained: Condvar::new(),
            processor,
            dead_letters: DeadLetters::new(),
            counters: Counters::default(),
            span: tracing::info_span!("queue", name = %config.name),
        });

        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let shared = Arc::clone(&shared);
            let shutdown_rx = shutdown_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-worker-{}", config.name, id))
                .spawn(move || shared.run_worker(id, shutdown_rx))?;
            workers.push(handle);
        }

        tracing::debug!(
            parent: &shared.span,
            "started {} workers (capacity {})",
            config.workers,
            config.queue_capacity
        );

        Ok(Self {
            shared,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            workers: Mutex::new(workers),
            worker_count: config.workers,
        })
    }

    // =========================================================================
    // Producer Side
    // =========================================================================

    /// Append a mutation at the tail
    ///
    /// Waits for room while a bounded queue is at capacity (in-flight items
    /// count). If the queue is full after the append, flushes before
    /// returning.
    pub fn put(&self, mutation: Mutation, enqueued_at: Option<u64>) -> Result<()> {
        let item = QueueItem::new(mutation, enqueued_at.unwrap_or_else(now_millis));
        self.enqueue(item, None)
    }

    /// Append an item, keeping `seq` if given or assigning the next one
    fn enqueue(&self, mut item: QueueItem, seq: Option<u64>) -> Result<()> {
        let shared = &self.shared;

        let full = {
            let mut state = shared.state.lock();
            while !state.closed && shared.is_full(&state) {
                shared.room.wait(&mut state);
            }
            if state.closed {
                tracing::error!(
                    parent: &shared.span,
                    "unable to put an item in the queue :: queue closed"
                );
                return Err(LeakError::QueueClosed);
            }

            item.seq = match seq {
                Some(seq) => seq,
                None => {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    seq
                }
            };

            tracing::trace!(
                parent: &shared.span,
                key = %item.mutation.key(),
                seq = item.seq,
                "put item"
            );
            shared
                .items_tx
                .send(item)
                .map_err(|_| LeakError::QueueClosed)?;
            state.queued += 1;
            state.unfinished += 1;

            shared.is_full(&state)
        };

        shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);

        if full {
            self.flush(false);
        }

        Ok(())
    }

    /// Block until every pending item has been processed
    ///
    /// Only waits when the queue is full or `force` is set. Items added
    /// while waiting are waited for too. Always returns true.
    pub fn flush(&self, force: bool) -> bool {
        let shared = &self.shared;
        let mut state = shared.state.lock();

        if !(force || shared.is_full(&state)) {
            return true;
        }

        tracing::info!(
            parent: &shared.span,
            "flushing queue ({} items, {} unfinished)",
            state.queued,
            state.unfinished
        );

        while state.unfinished > 0 && !state.closed {
            shared.drained.wait(&mut state);
        }

        true
    }

    /// Like `flush(true)`, but gives up after `timeout`
    ///
    /// Returns true if the queue drained in time.
    pub fn flush_timeout(&self, timeout: Duration) -> bool {
        let shared = &self.shared;
        let deadline = Instant::now() + timeout;
        let mut state = shared.state.lock();

        while state.unfinished > 0 && !state.closed {
            if shared.drained.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        state.unfinished == 0
    }

    /// Put every dead letter back in the queue with a fresh retry budget
    ///
    /// Items keep their original `seq`, so a replay never overrides a newer
    /// write to the same key.
    pub fn retry_dead_letters(&self) -> Result<usize> {
        let letters = self.shared.dead_letters.take();
        let count = letters.len();

        for letter in letters {
            let mut item = letter.item;
            let seq = item.seq;
            item.attempts = 0;
            self.enqueue(item, Some(seq))?;
        }

        Ok(count)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop the worker pool and join its threads
    ///
    /// Does not drain; call `flush(true)` first for a clean shutdown.
    /// Idempotent.
    pub fn shutdown(&self) {
        let shared = &self.shared;

        let pending = {
            let mut state = shared.state.lock();
            state.closed = true;
            state.unfinished
        };
        shared.room.notify_all();
        shared.drained.notify_all();

        // Disconnecting the shutdown channel wakes every worker
        drop(self.shutdown_tx.lock().take());

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        if workers.is_empty() {
            return;
        }
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!(parent: &shared.span, "queue worker panicked");
            }
        }

        if pending > 0 {
            tracing::warn!(
                parent: &shared.span,
                "queue shut down with {} unprocessed items",
                pending
            );
        } else {
            tracing::debug!(parent: &shared.span, "queue shut down");
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Items waiting in the queue (not counting in-flight ones)
    pub fn len(&self) -> usize {
        self.shared.state.lock().queued
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items waiting or in flight
    pub fn unfinished(&self) -> usize {
        self.shared.state.lock().unfinished
    }

    pub fn is_full(&self) -> bool {
        self.shared.is_full(&self.shared.state.lock())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Configured capacity (0 = unbounded)
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.shared.counters;
        QueueStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            processed: c.processed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            requeued: c.requeued.load(Ordering::Relaxed),
            dead_lettered: c.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// Copy of the items that exhausted their retries
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared.dead_letters.snapshot()
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Display for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} items in queue", self.len())
    }
}

// =============================================================================
// Worker Side
// =============================================================================

impl Shared {
    fn is_full(&self, state: &QueueState) -> bool {
        self.capacity > 0 && state.unfinished >= self.capacity
    }

    /// Worker loop: runs until the shutdown channel disconnects
    fn run_worker(&self, id: usize, shutdown_rx: Receiver<()>) {
        let _enter = self.span.enter();
        tracing::trace!(worker = id, "worker started");

        loop {
            channel::select! {
                recv(self.items_rx) -> msg => match msg {
                    Ok(item) => self.handle(item, &shutdown_rx),
                    Err(_) => break,
                },
                recv(shutdown_rx) -> _ => break,
                default(self.idle_wait) => {
                    tracing::trace!(worker = id, "queue is empty :: wait {:?}", self.idle_wait);
                }
            }
        }

        tracing::trace!(worker = id, "worker stopped");
    }

    fn handle(&self, mut item: QueueItem, shutdown_rx: &Receiver<()>) {
        self.state.lock().queued -= 1;

        tracing::debug!(
            key = %item.mutation.key(),
            operation = item.mutation.operation(),
            attempts = item.attempts,
            seq = item.seq,
            "get item"
        );

        let error = match self.processor.process(&item) {
            Ok(()) => {
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                self.finish_one();
                return;
            }
            Err(e) => e,
        };

        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        item.attempts += 1;

        if self.retry.is_exhausted(item.attempts) {
            tracing::error!(
                key = %item.mutation.key(),
                attempts = item.attempts,
                "dead-letter item :: {}",
                error
            );
            self.dead_letters.push(DeadLetter {
                item,
                error: error.to_string(),
            });
            self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
            self.finish_one();
            return;
        }

        let backoff = self.retry.backoff(item.attempts);
        tracing::warn!(
            key = %item.mutation.key(),
            attempts = item.attempts,
            "re-queue item in {:?} :: {}",
            backoff,
            error
        );

        // Interruptible sleep: returns early once shutdown disconnects
        if !backoff.is_zero() {
            if let Err(RecvTimeoutError::Disconnected) = shutdown_rx.recv_timeout(backoff) {
                tracing::debug!("backoff cut short by shutdown");
            }
        }

        self.requeue(item);
    }

    /// Put a failed item back at the tail; it stays unfinished
    fn requeue(&self, item: QueueItem) {
        let mut state = self.state.lock();
        if self.items_tx.send(item).is_ok() {
            state.queued += 1;
            self.counters.requeued.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Release an item's capacity slot
    fn finish_one(&self) {
        let mut state = self.state.lock();
        state.unfinished -= 1;
        if state.unfinished == 0 {
            self.drained.notify_all();
        }
        drop(state);
        self.room.notify_all();
    }
}
