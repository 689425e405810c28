use serde::{Deserialize, Serialize};

use stockledger_core::{ColorId, ProductId, SizeId, ValueObject};

/// A sellable configuration: product × color × size, independent of warehouse.
///
/// Never stored as its own row; it is the grouping key for FIFO depletion and
/// aggregate stock queries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub product_id: ProductId,
    pub color_id: ColorId,
    pub size_id: SizeId,
}

impl Variant {
    pub fn new(product_id: ProductId, color_id: ColorId, size_id: SizeId) -> Self {
        Self {
            product_id,
            color_id,
            size_id,
        }
    }
}

impl ValueObject for Variant {}

impl core::fmt::Display for Variant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "product={} color={} size={}",
            self.product_id, self.color_id, self.size_id
        )
    }
}
