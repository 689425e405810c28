//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse classification of a [`DomainError`].
///
/// Callers at the boundary (HTTP, document generation) map these to their own status
/// codes; the engine itself never retries any of them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced product/color/size/warehouse/record/movement does not exist.
    NotFound,
    /// Malformed input or relationships.
    Validation,
    /// Input is well-formed but the current state forbids the operation.
    BusinessRule,
    /// Unexpected persistence or infrastructure failure.
    Internal,
}

/// Domain-level error.
///
/// Every failure aborts the enclosing unit of work; no variant implies that a partial
/// mutation survived.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A requested resource was not found.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A value failed validation (e.g. non-positive quantity, mismatched relationship).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A transfer request is structurally impossible (same warehouse, same record).
    #[error("invalid transfer: {0}")]
    InvalidTransfer(String),

    /// A movement kind tag outside ENTRADA/SALIDA/AJUSTE/TRASLADO.
    #[error("unrecognized movement kind: {0}")]
    UnknownMovementKind(String),

    /// Requested quantity exceeds what is available.
    #[error("insufficient stock (requested: {requested}, available: {available})")]
    InsufficientStock { requested: i64, available: i64 },

    /// A stock record already exists for the product/color/size/warehouse tuple.
    #[error("a stock record already exists for this product/color/size/warehouse combination")]
    DuplicateVariant,

    /// A lot serial is already assigned to another stock record.
    #[error("lot serial already in use: {0}")]
    DuplicateSerial(String),

    /// Infrastructure failure surfaced through the domain boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transfer(msg: impl Into<String>) -> Self {
        Self::InvalidTransfer(msg.into())
    }

    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Validation(_)
            | DomainError::InvalidTransfer(_)
            | DomainError::UnknownMovementKind(_) => ErrorKind::Validation,
            DomainError::InsufficientStock { .. }
            | DomainError::DuplicateVariant
            | DomainError::DuplicateSerial(_) => ErrorKind::BusinessRule,
            DomainError::Internal(_) => ErrorKind::Internal,
        }
    }
}
