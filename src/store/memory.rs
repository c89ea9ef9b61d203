//! In-memory store implementation
//!
//! HashMap-based store with RwLock for reads and a write-order lock for
//! mutations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{LeakError, Result};

use super::{Mutation, MutationHook, NoopHook, Value};

/// In-memory key-value store
///
/// ## Concurrency Model
///
/// - **Reads** (get/get_multi): read lock on `data` only
/// - **Writes** (set/incr/decr/delete): serialized by `write_lock`, then a
///   short write lock on `data`, then the hook, still under `write_lock`
///
/// Holding `write_lock` across the read-modify-write of `incr`/`decr` is
/// what makes concurrent counters exact.
pub struct MemoryStore {
    /// Key → value map
    data: RwLock<HashMap<String, Value>>,

    /// Called after every successful mutation
    hook: RwLock<Arc<dyn MutationHook>>,

    /// Serializes mutations (set/incr/decr/delete)
    write_lock: Mutex<()>,

    /// Log scope for this instance
    span: tracing::Span,
}

impl MemoryStore {
    /// Create an empty store with no hook
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create an empty store whose log output is scoped under `name`
    pub fn named(name: &str) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            hook: RwLock::new(Arc::new(NoopHook)),
            write_lock: Mutex::new(()),
            span: tracing::info_span!("store", name = %name),
        }
    }

    /// Create an empty store that reports mutations to `hook`
    pub fn with_hook(hook: Arc<dyn MutationHook>) -> Self {
        let store = Self::new();
        store.set_hook(hook);
        store
    }

    /// Replace the mutation hook
    pub fn set_hook(&self, hook: Arc<dyn MutationHook>) {
        *self.hook.write() = hook;
    }

    /// The span this store logs under
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    // =========================================================================
    // Scalar Operations
    // =========================================================================

    /// Store `value` under `prefix + key` (or `key` when no prefix is given)
    ///
    /// Returns false if the key is empty or the hook rejected the mutation.
    /// A hook rejection happens after the memory write, so the new value is
    /// still visible to readers.
    pub fn set(&self, key: &str, value: impl Into<Value>, prefix: Option<&str>) -> bool {
        let full_key = match prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        };

        let _write_guard = self.write_lock.lock();
        self.set_locked(full_key, value.into())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Delete a key, returning its previous value
    ///
    /// The hook only hears about keys that actually existed.
    pub fn delete(&self, key: &str) -> Option<Value> {
        let _write_guard = self.write_lock.lock();

        let previous = self.data.write().remove(key)?;
        self.notify(Mutation::Delete {
            key: key.to_string(),
        });

        Some(previous)
    }

    // =========================================================================
    // Multi-key Operations
    // =========================================================================

    /// Apply `set` to every pair
    ///
    /// Every pair is attempted even after a failure, and pairs that
    /// succeeded stay applied. Returns true iff all of them succeeded.
    pub fn set_multi<I, K, V>(&self, mapping: I, prefix: Option<&str>) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        mapping
            .into_iter()
            .map(|(key, value)| self.set(key.as_ref(), value, prefix))
            .fold(true, |all_ok, ok| all_ok && ok)
    }

    /// Look up several keys at once
    ///
    /// Missing keys are omitted from the result.
    pub fn get_multi<I, K>(&self, keys: I) -> HashMap<String, Value>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let data = self.data.read();
        keys.into_iter()
            .filter_map(|key| {
                let key = key.as_ref();
                data.get(key).map(|value| (key.to_string(), value.clone()))
            })
            .collect()
    }

    // =========================================================================
    // Counter Operations
    // =========================================================================

    /// Increment a numeric value
    ///
    /// An absent key is created with `initial_value`, or with `delta` when no
    /// initial value is given.
    pub fn incr(&self, key: &str, delta: i64, initial_value: Option<i64>) -> Result<bool> {
        if delta < 0 {
            return Err(LeakError::InvalidDelta(delta));
        }

        let _write_guard = self.write_lock.lock();

        let next = match self.data.read().get(key) {
            Some(current) => apply_delta(key, current, delta)?,
            None => Value::Int(initial_value.unwrap_or(delta)),
        };

        Ok(self.set_locked(key.to_string(), next))
    }

    /// Decrement a numeric value
    ///
    /// Returns `Ok(false)` without touching the store if the key is absent.
    /// There is no floor: values can go negative.
    pub fn decr(&self, key: &str, delta: i64) -> Result<bool> {
        if delta < 0 {
            return Err(LeakError::InvalidDelta(delta));
        }

        let _write_guard = self.write_lock.lock();

        let next = match self.data.read().get(key) {
            Some(current) => apply_delta(key, current, -delta)?,
            None => return Ok(false),
        };

        Ok(self.set_locked(key.to_string(), next))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load entries without reporting them to the hook
    ///
    /// Used to resume from a durable backend: those entries are already
    /// persisted.
    pub fn prime<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let _write_guard = self.write_lock.lock();
        let mut data = self.data.write();
        let mut loaded = 0;
        for (key, value) in entries {
            data.insert(key, value);
            loaded += 1;
        }
        loaded
    }

    /// Detach the hook; later mutations stay memory-only
    pub fn close(&self) {
        self.set_hook(Arc::new(NoopHook));
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// All keys, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Write to memory then notify (caller holds `write_lock`)
    fn set_locked(&self, key: String, value: Value) -> bool {
        if key.is_empty() {
            tracing::error!(parent: &self.span, "unable to set a key :: empty key");
            return false;
        }

        self.data.write().insert(key.clone(), value.clone());
        self.notify(Mutation::Set { key, value })
    }

    fn notify(&self, mutation: Mutation) -> bool {
        let hook = Arc::clone(&*self.hook.read());
        let key = mutation.key().to_string();

        match hook.on_mutation(mutation) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(parent: &self.span, key = %key, "mutation hook failed :: {}", e);
                false
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} items in storage memory", self.len())
    }
}

/// Add a signed delta to a numeric value
///
/// `Int` fails when the sum overflows, `Float` when it is no longer finite.
fn apply_delta(key: &str, current: &Value, delta: i64) -> Result<Value> {
    let overflow = || LeakError::Overflow {
        key: key.to_string(),
    };

    match current {
        Value::Int(n) => n.checked_add(delta).map(Value::Int).ok_or_else(overflow),
        Value::Float(x) => {
            let next = x + delta as f64;
            if next.is_finite() {
                Ok(Value::Float(next))
            } else {
                Err(overflow())
            }
        }
        other => Err(LeakError::NonNumericValue {
            key: key.to_string(),
            found: other.type_name(),
        }),
    }
}
