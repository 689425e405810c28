//! Stock store seam: transactional access to records and the movement ledger.

pub mod r#trait;

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod schema;

pub use in_memory::{InMemoryStockStore, InMemoryTransaction};
pub use postgres::{PostgresStockStore, PostgresTransaction};
pub use query::{
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MovementFilter, MovementSortField, Page, PageRequest,
    SortDirection, StockSummary,
};
pub use r#trait::{LOT_SERIAL_CONSTRAINT, StockStore, StockTransaction, StoreError};
