//! Inventory ledger domain module.
//!
//! This crate contains the business rules for stock records and their movement
//! ledger, implemented purely as deterministic domain logic (no IO, no storage).
//! Orchestration inside a unit of work lives in `stockledger-infra`.

pub mod commands;
pub mod fifo;
pub mod movement;
pub mod record;
pub mod rules;
pub mod variant;

pub use commands::{AddLot, RegisterMovement, TransferDestination};
pub use fifo::{Depletion, aggregate_quantity, fifo_order, plan_depletion};
pub use movement::{ActingUser, MovementEntry, MovementKind, NewMovement, SaleRef};
pub use record::{Availability, DEFAULT_LOW_STOCK_THRESHOLD, NewStockRecord, StockRecord};
pub use rules::{
    ensure_positive, next_source_quantity, validate_destination_record, validate_transfer,
};
pub use variant::Variant;
