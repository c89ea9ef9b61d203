//! Processors invoked by queue workers

use crate::error::Result;

use super::QueueItem;

/// Work applied to each dequeued item
///
/// `Ok(())` removes the item from the queue. Any error sends it down the
/// retry path.
pub trait Processor: Send + Sync {
    fn process(&self, item: &QueueItem) -> Result<()>;
}

/// Processor that accepts every item
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessor;

impl Processor for NoopProcessor {
    fn process(&self, _item: &QueueItem) -> Result<()> {
        Ok(())
    }
}

impl<F> Processor for F
where
    F: Fn(&QueueItem) -> Result<()> + Send + Sync,
{
    fn process(&self, item: &QueueItem) -> Result<()> {
        self(item)
    }
}
