use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Entity, StockRecordId, WarehouseId};

use crate::variant::Variant;

/// Quantity at or below which a non-empty record is classified as low stock.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 4;

/// Derived stock classification, recomputed from quantity on every read.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    Available,
    LowStock,
    Depleted,
}

impl Availability {
    pub fn classify(quantity: i64, low_stock_threshold: i64) -> Self {
        if quantity <= 0 {
            Availability::Depleted
        } else if quantity <= low_stock_threshold {
            Availability::LowStock
        } else {
            Availability::Available
        }
    }
}

/// Quantity holder for one variant in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: StockRecordId,
    pub variant: Variant,
    pub warehouse_id: WarehouseId,
    /// Never negative.
    pub quantity: i64,
    /// Globally unique, immutable once assigned.
    pub lot_serial: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    pub fn availability(&self, low_stock_threshold: i64) -> Availability {
        Availability::classify(self.quantity, low_stock_threshold)
    }

    pub fn holds(&self, variant: &Variant) -> bool {
        self.variant == *variant
    }

    /// Copy of this record carrying a new quantity, as written by the store primitive.
    pub fn with_quantity(&self, quantity: i64, at: DateTime<Utc>) -> Self {
        Self {
            quantity,
            updated_at: at,
            ..self.clone()
        }
    }
}

impl Entity for StockRecord {
    type Id = StockRecordId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// A stock record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockRecord {
    pub variant: Variant,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub lot_serial: String,
    pub created_at: DateTime<Utc>,
}

impl NewStockRecord {
    pub fn into_record(self, id: StockRecordId) -> StockRecord {
        StockRecord {
            id,
            variant: self.variant,
            warehouse_id: self.warehouse_id,
            quantity: self.quantity,
            lot_serial: self.lot_serial,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}
