use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{SequenceAllocator, SequenceError, check_scope};

/// In-process counters, one per scope, each seeded at 1.
///
/// Safe across threads of one process; nothing survives a restart and nothing is
/// shared between processes.
#[derive(Debug, Default)]
pub struct InMemorySequenceAllocator {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl InMemorySequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, scope: &str) -> Result<Arc<AtomicU64>, SequenceError> {
        if let Some(counter) = self
            .counters
            .read()
            .map_err(|_| SequenceError::LockPoisoned)?
            .get(scope)
        {
            return Ok(counter.clone());
        }
        let mut counters = self
            .counters
            .write()
            .map_err(|_| SequenceError::LockPoisoned)?;
        Ok(counters
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(1)))
            .clone())
    }
}

#[async_trait]
impl SequenceAllocator for InMemorySequenceAllocator {
    async fn next(&self, scope: &str) -> Result<u64, SequenceError> {
        let scope = check_scope(scope)?;
        self.counter(scope)?
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1))
            .map_err(|_| SequenceError::Exhausted(scope.to_string()))
    }

    async fn reset(&self, scope: &str) -> Result<(), SequenceError> {
        let scope = check_scope(scope)?;
        self.counter(scope)?.store(1, Ordering::SeqCst);
        tracing::info!(scope, "sequence reset");
        Ok(())
    }

    async fn set(&self, scope: &str, value: u64) -> Result<(), SequenceError> {
        let scope = check_scope(scope)?;
        if value == 0 {
            return Err(SequenceError::InvalidValue(value));
        }
        self.counter(scope)?.store(value, Ordering::SeqCst);
        tracing::info!(scope, value, "sequence set");
        Ok(())
    }
}
