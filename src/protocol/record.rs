//! Record definitions
//!
//! The message shape carried by the transport, mirroring a queue item:
//! `{operation, item, date}`.

use serde::{Deserialize, Serialize};

use crate::error::{LeakError, Result};
use crate::queue::{now_millis, QueueItem};
use crate::store::{MemoryStore, Mutation, Value};
use crate::write_behind::WriteBehindStore;

/// Operation named by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Set,
    Delete,
}

/// Record payload: a bare key for deletes, a key/value entry for sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Key(String),
    Entry { key: String, value: Value },
}

/// A mutation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub operation: Operation,
    pub item: Item,

    /// Timestamp (unix millis) when the record was created
    pub date: u64,
}

impl Record {
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            operation: Operation::Set,
            item: Item::Entry {
                key: key.into(),
                value: value.into(),
            },
            date: now_millis(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            operation: Operation::Delete,
            item: Item::Key(key.into()),
            date: now_millis(),
        }
    }

    /// Convert to a mutation, rejecting operation/item mismatches
    pub fn into_mutation(self) -> Result<Mutation> {
        match (self.operation, self.item) {
            (Operation::Set, Item::Entry { key, value }) => Ok(Mutation::Set { key, value }),
            (Operation::Delete, Item::Key(key)) => Ok(Mutation::Delete { key }),
            (operation, item) => Err(LeakError::Protocol(format!(
                "record item does not match operation {:?}: {:?}",
                operation, item
            ))),
        }
    }
}

impl From<&QueueItem> for Record {
    fn from(item: &QueueItem) -> Self {
        let (operation, payload) = match &item.mutation {
            Mutation::Set { key, value } => (
                Operation::Set,
                Item::Entry {
                    key: key.clone(),
                    value: value.clone(),
                },
            ),
            Mutation::Delete { key } => (Operation::Delete, Item::Key(key.clone())),
        };

        Self {
            operation,
            item: payload,
            date: item.enqueued_at,
        }
    }
}

/// Something a received record can be applied to
///
/// Records go through the same `set`/`delete` path as a local caller.
pub trait ApplyRecord: Send + Sync {
    /// Returns whether the store changed
    fn apply_record(&self, record: Record) -> Result<bool>;
}

impl ApplyRecord for MemoryStore {
    fn apply_record(&self, record: Record) -> Result<bool> {
        match record.into_mutation()? {
            Mutation::Set { key, value } => Ok(self.set(&key, value, None)),
            Mutation::Delete { key } => Ok(self.delete(&key).is_some()),
        }
    }
}

impl ApplyRecord for WriteBehindStore {
    fn apply_record(&self, record: Record) -> Result<bool> {
        self.memory().apply_record(record)
    }
}
