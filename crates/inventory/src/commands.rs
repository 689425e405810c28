use serde::{Deserialize, Serialize};

use stockledger_core::{SaleId, StockRecordId, WarehouseId};

use crate::movement::MovementKind;
use crate::variant::Variant;

/// Command: AddLot (seed a new stock record for a variant in a warehouse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLot {
    pub variant: Variant,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    /// Generated from catalog labels when absent.
    pub lot_serial: Option<String>,
}

/// Where the destination side of a `TRASLADO` lands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDestination {
    /// An existing record of the same variant.
    Record(StockRecordId),
    /// The variant's record in this warehouse, created when missing.
    Warehouse(WarehouseId),
}

/// Command: RegisterMovement (generic ledger entry point for all movement kinds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMovement {
    pub stock_record_id: StockRecordId,
    pub kind: MovementKind,
    /// Magnitude, or the new absolute quantity for `Adjustment`.
    pub quantity: i64,
    pub description: String,
    pub reference: String,
    pub sale_id: Option<SaleId>,
    /// Required for `Transfer`, ignored otherwise.
    pub destination: Option<TransferDestination>,
}
