//! Quantity rules shared by every mutation path.
//!
//! These functions decide; they never mutate. The service applies their result to
//! the store inside one unit of work.

use stockledger_core::{DomainError, DomainResult, WarehouseId};

use crate::movement::MovementKind;
use crate::record::StockRecord;

pub fn ensure_positive(quantity: i64, what: &str) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation(format!(
            "{what} quantity must be greater than zero"
        )));
    }
    Ok(())
}

/// New quantity of the source record after a movement of `kind` and `quantity`.
///
/// `Adjustment` treats `quantity` as the new absolute value; every other kind treats
/// it as a strictly positive magnitude.
pub fn next_source_quantity(kind: MovementKind, current: i64, quantity: i64) -> DomainResult<i64> {
    match kind {
        MovementKind::Adjustment => {
            if quantity < 0 {
                return Err(DomainError::validation(
                    "adjustment quantity cannot be negative",
                ));
            }
            Ok(quantity)
        }
        MovementKind::Inbound => {
            ensure_positive(quantity, kind.as_str())?;
            current
                .checked_add(quantity)
                .ok_or_else(|| DomainError::validation("quantity overflow"))
        }
        MovementKind::Outbound | MovementKind::Transfer => {
            ensure_positive(quantity, kind.as_str())?;
            if quantity > current {
                return Err(DomainError::insufficient_stock(quantity, current));
            }
            Ok(current - quantity)
        }
    }
}

/// Checks a warehouse-to-warehouse move of `quantity` out of `origin`.
///
/// Existence of the destination warehouse is the caller's concern.
pub fn validate_transfer(
    origin: &StockRecord,
    destination_warehouse: WarehouseId,
    quantity: i64,
) -> DomainResult<()> {
    ensure_positive(quantity, "transfer")?;
    if quantity > origin.quantity {
        return Err(DomainError::insufficient_stock(quantity, origin.quantity));
    }
    if destination_warehouse == origin.warehouse_id {
        return Err(DomainError::invalid_transfer(
            "cannot transfer into the origin warehouse",
        ));
    }
    Ok(())
}

/// Checks an explicitly chosen destination record against the origin.
pub fn validate_destination_record(
    origin: &StockRecord,
    destination: &StockRecord,
) -> DomainResult<()> {
    if destination.id == origin.id || destination.warehouse_id == origin.warehouse_id {
        return Err(DomainError::invalid_transfer(
            "destination must be a record in another warehouse",
        ));
    }
    if destination.variant != origin.variant {
        return Err(DomainError::validation(
            "destination record must hold the same product, color and size",
        ));
    }
    Ok(())
}
