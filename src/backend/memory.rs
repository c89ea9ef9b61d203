//! Volatile backend
//!
//! Same contract as the file backend with nothing on disk. Handy for
//! embedding and for driving the retry path with injected failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{LeakError, Result};
use crate::store::{Mutation, Value};

use super::Backend;

#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Value>>,

    /// Number of upcoming `apply` calls that will fail
    failures_pending: AtomicUsize,

    applied: AtomicU64,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with entries already "persisted"
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let backend = Self::new();
        backend.entries.lock().extend(entries);
        backend
    }

    /// Make the next `count` calls to `apply` fail
    pub fn fail_next(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of mutations successfully applied
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Backend for MemoryBackend {
    fn load(&self) -> Result<Vec<(String, Value)>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&self, mutation: &Mutation) -> Result<()> {
        if self.is_closed() {
            return Err(LeakError::BackendClosed);
        }

        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(LeakError::Backend(format!(
                "injected failure for key '{}'",
                mutation.key()
            )));
        }

        let mut entries = self.entries.lock();
        match mutation {
            Mutation::Set { key, value } => {
                entries.insert(key.clone(), value.clone());
            }
            Mutation::Delete { key } => {
                entries.remove(key);
            }
        }
        self.applied.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
