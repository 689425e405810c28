//! `stockledger-core`: foundation building blocks shared by the ledger crates.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{ColorId, MovementId, ProductId, SaleId, SizeId, StockRecordId, WarehouseId};
pub use value_object::ValueObject;
