//! Boundary request/response shapes and their mapping to domain commands.

use serde::{Deserialize, Serialize};

use stockledger_core::{
    ColorId, DomainError, DomainResult, ProductId, SaleId, SizeId, StockRecordId, WarehouseId,
};
use stockledger_inventory::{
    ActingUser, AddLot, Availability, MovementKind, RegisterMovement, StockRecord,
    TransferDestination, Variant,
};

/// Inbound shape of a manual movement registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMovementRequest {
    pub stock_record_id: StockRecordId,
    /// Movement tag (`ENTRADA`, `SALIDA`, `AJUSTE`, `TRASLADO`), case-insensitive.
    pub kind: String,
    pub quantity: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub acting_user: Option<String>,
    #[serde(default)]
    pub sale_id: Option<SaleId>,
    #[serde(default)]
    pub destination_record_id: Option<StockRecordId>,
    #[serde(default)]
    pub destination_warehouse_id: Option<WarehouseId>,
}

impl RegisterMovementRequest {
    /// Resolve the tag, the destination and the acting user.
    ///
    /// An explicit destination record wins over a destination warehouse.
    pub fn into_command(self, default_actor: &str) -> DomainResult<(RegisterMovement, ActingUser)> {
        let kind: MovementKind = self.kind.parse()?;

        let destination = match (self.destination_record_id, self.destination_warehouse_id) {
            (Some(record), _) => Some(TransferDestination::Record(record)),
            (None, Some(warehouse)) => Some(TransferDestination::Warehouse(warehouse)),
            (None, None) => None,
        };

        match kind {
            MovementKind::Transfer if destination.is_none() => {
                return Err(DomainError::validation(
                    "a TRASLADO needs a destination record or destination warehouse",
                ));
            }
            MovementKind::Outbound if self.sale_id.is_none() => {
                return Err(DomainError::validation("a SALIDA needs a sale reference"));
            }
            _ => {}
        }

        let actor = ActingUser::resolve(self.acting_user.as_deref(), default_actor);
        let command = RegisterMovement {
            stock_record_id: self.stock_record_id,
            kind,
            quantity: self.quantity,
            description: self.description.unwrap_or_default(),
            reference: self.reference.unwrap_or_default(),
            sale_id: self.sale_id,
            destination: if kind == MovementKind::Transfer {
                destination
            } else {
                None
            },
        };
        Ok((command, actor))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLotRequest {
    pub product_id: ProductId,
    pub color_id: ColorId,
    pub size_id: SizeId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    #[serde(default)]
    pub lot_serial: Option<String>,
}

impl From<AddLotRequest> for AddLot {
    fn from(req: AddLotRequest) -> Self {
        AddLot {
            variant: Variant::new(req.product_id, req.color_id, req.size_id),
            warehouse_id: req.warehouse_id,
            quantity: req.quantity,
            lot_serial: req.lot_serial.filter(|s| !s.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub stock_record_id: StockRecordId,
    pub destination_warehouse_id: WarehouseId,
    pub quantity: i64,
}

/// A stock record together with its derived availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecordView {
    #[serde(flatten)]
    pub record: StockRecord,
    pub availability: Availability,
}

impl StockRecordView {
    pub fn new(record: StockRecord, low_stock_threshold: i64) -> Self {
        let availability = record.availability(low_stock_threshold);
        Self {
            record,
            availability,
        }
    }
}
