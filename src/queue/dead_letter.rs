//! Dead-letter list for items that exhausted their retries

use parking_lot::Mutex;

use super::QueueItem;

/// An item that failed `max_attempts` times, with the last error seen
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub item: QueueItem,
    pub error: String,
}

/// Items parked after exhausting their retry budget
///
/// Nothing here is ever discarded implicitly: items stay until taken.
#[derive(Debug, Default)]
pub struct DeadLetters {
    items: Mutex<Vec<DeadLetter>>,
}

impl DeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, letter: DeadLetter) {
        self.items.lock().push(letter);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copy of the current dead letters, oldest first
    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.items.lock().clone()
    }

    /// Remove and return every dead letter, oldest first
    pub fn take(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut *self.items.lock())
    }
}
