//! Correlative numbering.
//!
//! Two strategies coexist:
//! - a per-scope counter behind the [`SequenceAllocator`] seam (in-memory for tests/dev,
//!   a counter row in Postgres for production), formatted by [`CorrelativeService`];
//! - "max + 1" over previously issued document numbers ([`DocumentNumbering`]), which
//!   two concurrent readers can resolve to the same value.

pub mod correlative;
pub mod in_memory;
pub mod numbering;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use stockledger_core::DomainError;

pub use correlative::CorrelativeService;
pub use in_memory::InMemorySequenceAllocator;
pub use numbering::{
    DocumentKind, DocumentNumberSource, DocumentNumbering, InMemoryDocumentNumbers,
    MAX_CORRELATIVE,
};
pub use postgres::PostgresSequenceAllocator;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("sequence scope cannot be empty")]
    EmptyScope,

    #[error("sequence values start at 1 (got {0})")]
    InvalidValue(u64),

    #[error("sequence exhausted for scope {0}")]
    Exhausted(String),

    #[error("sequence storage error: {0}")]
    Storage(String),

    #[error("sequence lock poisoned")]
    LockPoisoned,
}

impl From<SequenceError> for DomainError {
    fn from(err: SequenceError) -> Self {
        match err {
            SequenceError::EmptyScope | SequenceError::InvalidValue(_) => {
                DomainError::validation(err.to_string())
            }
            other => DomainError::internal(other.to_string()),
        }
    }
}

pub(crate) fn check_scope(scope: &str) -> Result<&str, SequenceError> {
    let scope = scope.trim();
    if scope.is_empty() {
        return Err(SequenceError::EmptyScope);
    }
    Ok(scope)
}

/// Monotonic number generator per logical scope.
///
/// Implementations must return strictly increasing, never-repeating values for repeated
/// `next()` calls on one scope, starting at `1`.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    async fn next(&self, scope: &str) -> Result<u64, SequenceError>;

    /// The next call to `next(scope)` returns `1`.
    async fn reset(&self, scope: &str) -> Result<(), SequenceError>;

    /// The next call to `next(scope)` returns `value`.
    async fn set(&self, scope: &str, value: u64) -> Result<(), SequenceError>;
}

#[async_trait]
impl<A> SequenceAllocator for Arc<A>
where
    A: SequenceAllocator + ?Sized,
{
    async fn next(&self, scope: &str) -> Result<u64, SequenceError> {
        (**self).next(scope).await
    }

    async fn reset(&self, scope: &str) -> Result<(), SequenceError> {
        (**self).reset(scope).await
    }

    async fn set(&self, scope: &str, value: u64) -> Result<(), SequenceError> {
        (**self).set(scope, value).await
    }
}
