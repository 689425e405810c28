use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockledger_core::{
    DomainError, MovementId, ProductId, StockRecordId, WarehouseId,
};
use stockledger_inventory::{MovementEntry, NewMovement, NewStockRecord, StockRecord, Variant};

use super::query::{MovementFilter, Page, PageRequest, StockSummary};

/// Constraint name reported when a lot serial collides.
pub const LOT_SERIAL_CONSTRAINT: &str = "stock_records_lot_serial_key";

/// Stock store operation error.
///
/// These are **infrastructure errors** (storage, constraints, locking) as opposed to
/// domain errors (validation, business rules). Constraint violations surface the
/// constraint name so the service can translate them into the matching domain error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String, detail: String },

    #[error("check constraint violated: {0}")]
    CheckViolation(String),

    #[error("stock record {0} does not exist")]
    MissingRecord(StockRecordId),

    #[error("stored row could not be decoded: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { constraint, detail }
                if constraint == LOT_SERIAL_CONSTRAINT =>
            {
                DomainError::DuplicateSerial(detail)
            }
            StoreError::MissingRecord(id) => DomainError::not_found("stock record", id),
            other => DomainError::internal(other.to_string()),
        }
    }
}

/// Transactional store for stock records and their movement ledger.
///
/// ## Unit of Work
///
/// Every inventory mutation runs inside one [`StockTransaction`]: reads observe the
/// transaction's own writes, and either all writes become visible at `commit()` or none
/// do. Dropping a transaction without committing discards its writes.
///
/// ## Isolation
///
/// The store decides the isolation level. The in-memory store defaults to
/// read-committed (quantity writes are absolute, so two interleaved consumers can lose
/// an update) and offers a serialized mode; Postgres runs at the database default.
#[async_trait]
pub trait StockStore: Send + Sync {
    type Tx: StockTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }
}

/// Operations available inside one unit of work.
///
/// Implementations must:
/// - assign record and movement ids that are never reused
/// - reject a lot serial that is already held by another visible record
/// - reject a negative quantity on `update_quantity`
/// - return multi-record reads for a variant in FIFO order (creation time, then id)
#[async_trait]
pub trait StockTransaction: Send {
    async fn insert_record(&mut self, record: NewStockRecord) -> Result<StockRecord, StoreError>;

    async fn record(&mut self, id: StockRecordId) -> Result<Option<StockRecord>, StoreError>;

    async fn record_by_serial(&mut self, serial: &str) -> Result<Option<StockRecord>, StoreError>;

    /// Oldest first.
    async fn records_by_variant(&mut self, variant: &Variant)
    -> Result<Vec<StockRecord>, StoreError>;

    async fn record_in_warehouse(
        &mut self,
        variant: &Variant,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockRecord>, StoreError>;

    async fn records_by_warehouse(
        &mut self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockRecord>, StoreError>;

    async fn records_by_product(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<StockRecord>, StoreError>;

    /// Records with `quantity <= threshold`, empty ones included.
    async fn low_stock(&mut self, threshold: i64) -> Result<Vec<StockRecord>, StoreError>;

    async fn all_records(&mut self) -> Result<Vec<StockRecord>, StoreError>;

    async fn sum_for_product(&mut self, product_id: ProductId) -> Result<i64, StoreError>;

    async fn sum_for_variant(&mut self, variant: &Variant) -> Result<i64, StoreError>;

    /// Record counts by availability and the total of all quantities.
    async fn summary(&mut self, low_stock_threshold: i64) -> Result<StockSummary, StoreError>;

    /// Overwrite the quantity with an absolute value.
    async fn update_quantity(
        &mut self,
        id: StockRecordId,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> Result<StockRecord, StoreError>;

    /// Ledger entries that reference the record are kept.
    async fn delete_record(&mut self, id: StockRecordId) -> Result<bool, StoreError>;

    async fn append_movement(&mut self, movement: NewMovement)
    -> Result<MovementEntry, StoreError>;

    async fn movement(&mut self, id: MovementId) -> Result<Option<MovementEntry>, StoreError>;

    async fn query_movements(
        &mut self,
        filter: &MovementFilter,
        page: &PageRequest,
    ) -> Result<Page<MovementEntry>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
