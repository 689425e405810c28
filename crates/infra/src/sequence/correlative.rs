use std::sync::Arc;

use crate::collaborators::Clock;

use super::{SequenceAllocator, SequenceError};

pub const DEFAULT_WIDTH: usize = 4;

/// Dated correlatives: `<prefix>-<yyyyMMdd>-<n>`, one counter per prefix and day.
pub struct CorrelativeService<A, C: ?Sized = dyn Clock> {
    allocator: A,
    clock: Arc<C>,
    width: usize,
}

impl<A, C> CorrelativeService<A, C>
where
    A: SequenceAllocator,
    C: Clock + ?Sized,
{
    pub fn new(allocator: A, clock: Arc<C>) -> Self {
        Self {
            allocator,
            clock,
            width: DEFAULT_WIDTH,
        }
    }

    /// Zero-padding width of the counter part.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn scope_for_today(&self, prefix: &str) -> String {
        format!("{}-{}", prefix.trim(), self.clock.now().format("%Y%m%d"))
    }

    pub async fn next_dated(&self, prefix: &str) -> Result<String, SequenceError> {
        let scope = self.scope_for_today(prefix);
        let value = self.allocator.next(&scope).await?;
        Ok(format!("{scope}-{value:0width$}", width = self.width))
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}
