//! FIFO depletion planning for sales that span several stock records.

use stockledger_core::{DomainError, DomainResult, StockRecordId};

use crate::record::StockRecord;
use crate::rules::ensure_positive;

/// One step of a FIFO plan: take `quantity` from `record_id`, leaving `remaining`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Depletion {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub remaining: i64,
}

/// Records sorted oldest first (creation time, then id).
pub fn fifo_order(records: &[StockRecord]) -> Vec<&StockRecord> {
    let mut ordered: Vec<&StockRecord> = records.iter().collect();
    ordered.sort_by_key(|r| (r.created_at, r.id));
    ordered
}

/// Sum of quantities across records, ignoring any non-positive value.
pub fn aggregate_quantity(records: &[StockRecord]) -> i64 {
    records.iter().map(|r| r.quantity.max(0)).sum()
}

/// Plan the depletion of `requested` units across `records` in FIFO order.
///
/// Fails with `InsufficientStock` when the aggregate is short; in that case nothing
/// is planned. Empty records are skipped, so every step takes at least one unit.
pub fn plan_depletion(records: &[StockRecord], requested: i64) -> DomainResult<Vec<Depletion>> {
    ensure_positive(requested, "sale")?;

    let available = aggregate_quantity(records);
    if available < requested {
        return Err(DomainError::insufficient_stock(requested, available));
    }

    let mut outstanding = requested;
    let mut plan = Vec::new();
    for record in fifo_order(records) {
        if outstanding == 0 {
            break;
        }
        if record.quantity <= 0 {
            continue;
        }
        let take = record.quantity.min(outstanding);
        outstanding -= take;
        plan.push(Depletion {
            record_id: record.id,
            quantity: take,
            remaining: record.quantity - take,
        });
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;
    use stockledger_core::{ColorId, ProductId, SizeId, WarehouseId};

    use crate::variant::Variant;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn record(id: i64, minutes: i64, quantity: i64) -> StockRecord {
        StockRecord {
            id: StockRecordId::new(id),
            variant: Variant::new(ProductId::new(1), ColorId::new(1), SizeId::new(1)),
            warehouse_id: WarehouseId::new(id),
            quantity,
            lot_serial: format!("LOT-{id}"),
            created_at: base_time() + Duration::minutes(minutes),
            updated_at: base_time() + Duration::minutes(minutes),
        }
    }

    #[test]
    fn consumes_oldest_record_first() {
        let records = vec![record(1, 0, 3), record(2, 5, 5)];
        let plan = plan_depletion(&records, 4).unwrap();
        assert_eq!(
            plan,
            vec![
                Depletion { record_id: StockRecordId::new(1), quantity: 3, remaining: 0 },
                Depletion { record_id: StockRecordId::new(2), quantity: 1, remaining: 4 },
            ]
        );
    }

    #[test]
    fn ordering_follows_creation_time_not_input_order() {
        let records = vec![record(7, 10, 2), record(3, 1, 2)];
        let plan = plan_depletion(&records, 3).unwrap();
        assert_eq!(plan[0].record_id, StockRecordId::new(3));
        assert_eq!(plan[1].record_id, StockRecordId::new(7));
    }

    #[test]
    fn skips_empty_records() {
        let records = vec![record(1, 0, 0), record(2, 1, 4)];
        let plan = plan_depletion(&records, 2).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].record_id, StockRecordId::new(2));
    }

    #[test]
    fn short_aggregate_plans_nothing() {
        let records = vec![record(1, 0, 3), record(2, 1, 1)];
        assert_eq!(
            plan_depletion(&records, 5),
            Err(DomainError::insufficient_stock(5, 4))
        );
    }

    #[test]
    fn zero_request_is_invalid() {
        assert!(matches!(
            plan_depletion(&[record(1, 0, 3)], 0),
            Err(DomainError::Validation(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a successful plan takes exactly the requested amount, never
        /// drives a record below zero, and fully drains every record before the last
        /// one it touches.
        #[test]
        fn plan_conserves_and_respects_fifo(
            quantities in prop::collection::vec(0i64..50, 1..12),
            requested in 1i64..400,
        ) {
            let records: Vec<StockRecord> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| record(i as i64 + 1, i as i64, *q))
                .collect();
            let total: i64 = quantities.iter().sum();

            match plan_depletion(&records, requested) {
                Ok(plan) => {
                    prop_assert!(total >= requested);
                    prop_assert_eq!(plan.iter().map(|d| d.quantity).sum::<i64>(), requested);
                    for d in &plan {
                        prop_assert!(d.quantity > 0);
                        prop_assert!(d.remaining >= 0);
                    }
                    for d in plan.iter().take(plan.len().saturating_sub(1)) {
                        prop_assert_eq!(d.remaining, 0);
                    }
                    let ids: Vec<i64> = plan.iter().map(|d| d.record_id.get()).collect();
                    let mut sorted = ids.clone();
                    sorted.sort();
                    prop_assert_eq!(ids, sorted);
                }
                Err(e) => {
                    prop_assert!(total < requested);
                    prop_assert_eq!(e, DomainError::insufficient_stock(requested, total));
                }
            }
        }
    }
}
