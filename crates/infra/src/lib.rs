//! Infrastructure layer: stock store adapters, collaborators, orchestration, numbering
//! and configuration.

pub mod collaborators;
pub mod config;
pub mod mapping;
pub mod sequence;
pub mod serial;
pub mod service;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use collaborators::{
    Clock, FixedClock, InMemoryCatalog, InMemoryWarehouses, ProductCatalog, SystemClock,
    VariantLabels, Warehouse, WarehouseDirectory,
};
pub use config::InventoryConfig;
pub use mapping::{AddLotRequest, RegisterMovementRequest, StockRecordView, TransferRequest};
pub use sequence::{
    CorrelativeService, DocumentKind, DocumentNumberSource, DocumentNumbering,
    InMemoryDocumentNumbers, InMemorySequenceAllocator, PostgresSequenceAllocator,
    SequenceAllocator, SequenceError,
};
pub use service::{InventoryService, TransferOutcome};
pub use store::{
    InMemoryStockStore, MovementFilter, MovementSortField, Page, PageRequest,
    PostgresStockStore, SortDirection, StockStore, StockSummary, StockTransaction, StoreError,
};
