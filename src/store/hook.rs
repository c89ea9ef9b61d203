//! Mutation hooks
//!
//! A hook is called by [`MemoryStore`](super::MemoryStore) after every
//! successful in-memory mutation. Write-behind persistence is driven from
//! here.

use crate::error::Result;

use super::Mutation;

/// Callback invoked after every successful in-memory mutation
///
/// Hooks run while the store's write-order lock is held, so they observe
/// mutations in the same order memory applied them. A hook may block (a
/// full queue flushes from inside `on_mutation`), which stalls other
/// writers but never readers.
pub trait MutationHook: Send + Sync {
    fn on_mutation(&self, mutation: Mutation) -> Result<()>;
}

/// Hook that ignores every mutation
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl MutationHook for NoopHook {
    fn on_mutation(&self, _mutation: Mutation) -> Result<()> {
        Ok(())
    }
}

impl<F> MutationHook for F
where
    F: Fn(Mutation) -> Result<()> + Send + Sync,
{
    fn on_mutation(&self, mutation: Mutation) -> Result<()> {
        self(mutation)
    }
}
