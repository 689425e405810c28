//! Integration tests for the inventory pipeline.
//!
//! Tests: request mapping → InventoryService → StockStore → movement queries
//!
//! Verifies:
//! - The end-to-end lot/transfer/sale/annulment flow
//! - FIFO depletion, conservation and transfer round-trips
//! - Atomicity of failed and multi-step units of work
//! - The concurrent-sale race under read-committed and serialized stores
//! - Sequence monotonicity under concurrency

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;

    use stockledger_core::{
        ColorId, DomainError, ProductId, SaleId, SizeId, StockRecordId, WarehouseId,
    };
    use stockledger_inventory::{ActingUser, AddLot, MovementKind, SaleRef, Variant};

    use crate::collaborators::{FixedClock, InMemoryCatalog, InMemoryWarehouses};
    use crate::config::InventoryConfig;
    use crate::mapping::{AddLotRequest, RegisterMovementRequest, TransferRequest};
    use crate::sequence::{CorrelativeService, InMemorySequenceAllocator, SequenceAllocator};
    use crate::service::InventoryService;
    use crate::store::{
        InMemoryStockStore, MovementFilter, MovementSortField, PageRequest, SortDirection,
        StockTransaction,
    };

    const W1: i64 = 1;
    const W2: i64 = 2;

    fn red_m() -> Variant {
        Variant::new(ProductId::new(40), ColorId::new(1), SizeId::new(10))
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    struct Fixture {
        service: Arc<InventoryService<InMemoryStockStore>>,
        clock: Arc<FixedClock>,
    }

    fn setup_with(store: InMemoryStockStore) -> Fixture {
        stockledger_observability::init_for_tests();
        let clock = Arc::new(FixedClock::new(start()));
        let catalog = InMemoryCatalog::new()
            .with_product(40, Some("CAMISA"), Some("Levis"))
            .with_color(1, 40, "Red")
            .with_size(10, 1, "M");
        let warehouses = InMemoryWarehouses::new()
            .with(W1, "Central")
            .with(W2, "Norte")
            .with(3, "Sur");
        let service = InventoryService::new(
            store,
            Arc::new(warehouses),
            Arc::new(catalog),
            clock.clone(),
        );
        Fixture {
            service: Arc::new(service),
            clock,
        }
    }

    fn setup() -> Fixture {
        setup_with(InMemoryStockStore::new())
    }

    fn actor() -> ActingUser {
        ActingUser::new("cashier-1")
    }

    fn sale(n: i64) -> SaleRef {
        SaleRef::new(SaleId::new(n), format!("sale#{n}"))
    }

    async fn seed(f: &Fixture, warehouse: i64, quantity: i64) -> StockRecordId {
        let record = f
            .service
            .add_lot(
                AddLot {
                    variant: red_m(),
                    warehouse_id: WarehouseId::new(warehouse),
                    quantity,
                    lot_serial: None,
                },
                &actor(),
            )
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(1));
        record.id
    }

    async fn quantity(f: &Fixture, id: StockRecordId) -> i64 {
        f.service.get_by_id(id).await.unwrap().quantity
    }

    #[tokio::test]
    async fn end_to_end_lot_transfer_sale_and_annulment() {
        let f = setup();
        let w1 = seed(&f, W1, 10).await;
        assert_eq!(f.service.get_available_for_variant(red_m()).await.unwrap(), 10);

        let outcome = f
            .service
            .transfer(w1, WarehouseId::new(W2), 4, &actor())
            .await
            .unwrap();
        let w2 = outcome.destination.id;
        assert_eq!(quantity(&f, w1).await, 6);
        assert_eq!(quantity(&f, w2).await, 4);
        f.clock.advance(Duration::minutes(1));

        let consumed = f
            .service
            .consume_for_sale(red_m(), 5, &sale(1), &actor())
            .await
            .unwrap();
        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].source_record_id, w1);
        assert_eq!(quantity(&f, w1).await, 1);
        assert_eq!(quantity(&f, w2).await, 4);
        f.clock.advance(Duration::minutes(1));

        let reversal = f
            .service
            .reverse_for_annulment(red_m(), 5, &sale(1), &actor())
            .await
            .unwrap();
        assert_eq!(reversal.source_record_id, w1);
        assert_eq!(reversal.kind, MovementKind::Inbound);
        assert_eq!(quantity(&f, w1).await, 6);
        assert_eq!(quantity(&f, w2).await, 4);
        assert_eq!(f.service.get_available_for_variant(red_m()).await.unwrap(), 10);

        // TRASLADO + ENTRADA for the transfer, SALIDA for the sale, ENTRADA for the annulment.
        let ledger = f
            .service
            .list_movements(&MovementFilter::default(), PageRequest::new(0, 50))
            .await
            .unwrap();
        assert_eq!(ledger.total_elements, 4);
        let kinds: Vec<MovementKind> = ledger.content.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MovementKind::Inbound,
                MovementKind::Outbound,
                MovementKind::Inbound,
                MovementKind::Transfer,
            ]
        );
        assert!(ledger.content.iter().all(|e| e.acting_user == "cashier-1"));
    }

    #[tokio::test]
    async fn sale_depletes_oldest_record_first() {
        let f = setup();
        let r1 = seed(&f, W1, 3).await;
        let r2 = seed(&f, W2, 5).await;

        let entries = f
            .service
            .consume_for_sale(red_m(), 4, &sale(2), &actor())
            .await
            .unwrap();

        assert_eq!(quantity(&f, r1).await, 0);
        assert_eq!(quantity(&f, r2).await, 4);
        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].source_record_id, entries[0].quantity), (r1, 3));
        assert_eq!((entries[1].source_record_id, entries[1].quantity), (r2, 1));
        assert!(entries.iter().all(|e| e.kind == MovementKind::Outbound));
    }

    #[tokio::test]
    async fn transfer_round_trip_restores_quantities() {
        let f = setup();
        let a = seed(&f, W1, 7).await;
        let b = seed(&f, W2, 2).await;

        f.service
            .transfer(a, WarehouseId::new(W2), 5, &actor())
            .await
            .unwrap();
        assert_eq!(quantity(&f, b).await, 7);
        f.service
            .transfer(b, WarehouseId::new(W1), 5, &actor())
            .await
            .unwrap();

        assert_eq!(quantity(&f, a).await, 7);
        assert_eq!(quantity(&f, b).await, 2);
        assert_eq!(f.service.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reversal_restores_the_aggregate() {
        let f = setup();
        seed(&f, W1, 2).await;
        seed(&f, W2, 4).await;
        let before = f.service.get_available_for_variant(red_m()).await.unwrap();

        f.service
            .consume_for_sale(red_m(), 5, &sale(1), &actor())
            .await
            .unwrap();
        assert_eq!(
            f.service.get_available_for_variant(red_m()).await.unwrap(),
            before - 5
        );
        f.service
            .reverse_for_annulment(red_m(), 5, &sale(1), &actor())
            .await
            .unwrap();

        assert_eq!(
            f.service.get_available_for_variant(red_m()).await.unwrap(),
            before
        );
    }

    #[tokio::test]
    async fn failed_line_rolls_back_the_whole_sale() {
        let f = setup();
        let record = seed(&f, W1, 4).await;

        let mut tx = f.service.begin().await.unwrap();
        f.service
            .consume_for_sale_in(&mut tx, red_m(), 3, &sale(9), &actor())
            .await
            .unwrap();
        let second_line = f
            .service
            .consume_for_sale_in(&mut tx, red_m(), 2, &sale(9), &actor())
            .await;
        assert_eq!(second_line, Err(DomainError::insufficient_stock(2, 1)));
        tx.rollback().await.unwrap();

        assert_eq!(quantity(&f, record).await, 4);
        assert!(f.service.store().committed_movements().unwrap().is_empty());
    }

    #[tokio::test]
    async fn composed_unit_of_work_commits_together() {
        let f = setup();
        let record = seed(&f, W1, 10).await;

        let mut tx = f.service.begin().await.unwrap();
        f.service
            .consume_for_sale_in(&mut tx, red_m(), 3, &sale(4), &actor())
            .await
            .unwrap();
        f.service
            .consume_for_sale_in(&mut tx, red_m(), 2, &sale(4), &actor())
            .await
            .unwrap();
        assert_eq!(quantity(&f, record).await, 10);
        tx.commit().await.unwrap();

        assert_eq!(quantity(&f, record).await, 5);
        let for_record = f
            .service
            .list_movements_for_record(record, 0, 10)
            .await
            .unwrap();
        assert_eq!(for_record.total_elements, 2);
    }

    #[tokio::test]
    async fn interleaved_sales_over_deplete_under_read_committed() {
        let f = setup();
        let record = seed(&f, W1, 5).await;

        let mut first = f.service.begin().await.unwrap();
        let mut second = f.service.begin().await.unwrap();
        f.service
            .consume_for_sale_in(&mut first, red_m(), 3, &sale(1), &actor())
            .await
            .unwrap();
        // The second sale still sees 5 units: the first has not committed.
        f.service
            .consume_for_sale_in(&mut second, red_m(), 3, &sale(2), &actor())
            .await
            .unwrap();
        first.commit().await.unwrap();
        second.commit().await.unwrap();

        let sold: i64 = f
            .service
            .store()
            .committed_movements()
            .unwrap()
            .iter()
            .filter(|e| e.kind == MovementKind::Outbound)
            .map(|e| e.quantity)
            .sum();
        assert_eq!(sold, 6);
        // Lost update: the record shows 2 although 6 of 5 units were sold.
        assert_eq!(quantity(&f, record).await, 2);
    }

    #[tokio::test]
    async fn interleaved_lots_for_one_warehouse_both_commit_under_read_committed() {
        let f = setup();
        let lot = || AddLot {
            variant: red_m(),
            warehouse_id: WarehouseId::new(W1),
            quantity: 2,
            lot_serial: None,
        };

        let mut first = f.service.begin().await.unwrap();
        let mut second = f.service.begin().await.unwrap();
        f.service.add_lot_in(&mut first, lot(), &actor()).await.unwrap();
        // The duplicate check reads committed state only, and the store adds no guard.
        f.service.add_lot_in(&mut second, lot(), &actor()).await.unwrap();
        first.commit().await.unwrap();
        second.commit().await.unwrap();

        assert_eq!(
            f.service
                .get_by_warehouse(WarehouseId::new(W1))
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            f.service.add_lot(lot(), &actor()).await,
            Err(DomainError::DuplicateVariant)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn serialized_store_rejects_the_second_sale() {
        let f = setup_with(InMemoryStockStore::serialized());
        let record = seed(&f, W1, 5).await;

        let mut handles = Vec::new();
        for n in 1..=2 {
            let service = f.service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .consume_for_sale(red_m(), 3, &sale(n), &ActingUser::new("pos"))
                    .await
            }));
        }
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|o| *o == Err(DomainError::insufficient_stock(3, 2))));
        assert_eq!(quantity(&f, record).await, 2);
    }

    #[tokio::test]
    async fn manual_movements_flow_through_request_mapping() {
        let f = setup();
        let record = seed(&f, W1, 6).await;

        let request: RegisterMovementRequest = serde_json::from_value(serde_json::json!({
            "stock_record_id": record.get(),
            "kind": "traslado",
            "quantity": 2,
            "description": "restock north",
            "destination_warehouse_id": W2,
        }))
        .unwrap();
        let (command, who) = request
            .into_command(&f.service.config().default_actor)
            .unwrap();
        assert_eq!(who, ActingUser::anonymous());

        let entry = f.service.register_movement(command, &who).await.unwrap();
        let destination = entry.destination_record_id.unwrap();
        assert_eq!(quantity(&f, record).await, 4);
        assert_eq!(quantity(&f, destination).await, 2);
        assert_eq!(
            f.service.get_by_id(destination).await.unwrap().warehouse_id,
            WarehouseId::new(W2)
        );

        let transfer: TransferRequest = serde_json::from_value(serde_json::json!({
            "stock_record_id": record.get(),
            "destination_warehouse_id": W2,
            "quantity": 1,
        }))
        .unwrap();
        let outcome = f
            .service
            .transfer(
                transfer.stock_record_id,
                transfer.destination_warehouse_id,
                transfer.quantity,
                &who,
            )
            .await
            .unwrap();
        // The record created by the first move is reused.
        assert_eq!(outcome.destination.id, destination);
        assert_eq!(outcome.destination.quantity, 3);
    }

    #[tokio::test]
    async fn add_lot_request_maps_to_a_record() {
        let f = setup();
        let request: AddLotRequest = serde_json::from_value(serde_json::json!({
            "product_id": 40,
            "color_id": 1,
            "size_id": 10,
            "warehouse_id": 3,
            "quantity": 8,
            "lot_serial": "",
        }))
        .unwrap();
        let record = f.service.add_lot(request.into(), &actor()).await.unwrap();
        assert!(record.lot_serial.starts_with("CAM-LEV-REM20240501"));
        assert_eq!(
            f.service.get_by_serial(&record.lot_serial).await.unwrap().id,
            record.id
        );
    }

    #[tokio::test]
    async fn movement_listing_filters_sorts_and_pages() {
        let f = setup();
        let a = seed(&f, W1, 20).await;
        for (n, qty) in [(1, 4), (2, 1), (3, 6)] {
            f.service
                .consume_for_sale(red_m(), qty, &sale(n), &actor())
                .await
                .unwrap();
            f.clock.advance(Duration::minutes(5));
        }
        f.service.adjust_stock(a, 30, &actor()).await.unwrap();

        let outbound = MovementFilter {
            kind: Some(MovementKind::Outbound),
            product_id: Some(ProductId::new(40)),
            ..MovementFilter::default()
        };
        let page = f
            .service
            .list_movements(&outbound, PageRequest::new(0, 2))
            .await
            .unwrap();
        assert_eq!(page.total_elements, 3);
        assert_eq!(page.total_pages, 2);
        assert!(!page.last);
        // Newest first by default.
        assert_eq!(page.content[0].quantity, 6);

        let by_quantity = f
            .service
            .list_movements(
                &outbound,
                PageRequest::new(0, 10).sorted(MovementSortField::Quantity, SortDirection::Asc),
            )
            .await
            .unwrap();
        let quantities: Vec<i64> = by_quantity.content.iter().map(|e| e.quantity).collect();
        assert_eq!(quantities, vec![1, 4, 6]);

        let window = MovementFilter {
            from: Some(start() + Duration::minutes(6)),
            to: Some(start() + Duration::minutes(11)),
            ..MovementFilter::default()
        };
        let in_window = f
            .service
            .list_movements(&window, PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(in_window.total_elements, 2);

        let beyond = f
            .service
            .list_movements(&outbound, PageRequest::new(5, 2))
            .await
            .unwrap();
        assert!(beyond.content.is_empty());
        assert!(beyond.last);
    }

    #[tokio::test]
    async fn configured_threshold_drives_availability() {
        let f = setup();
        let service = InventoryService::new(
            InMemoryStockStore::new(),
            Arc::new(InMemoryWarehouses::new().with(W1, "Central")),
            Arc::new(
                InMemoryCatalog::new()
                    .with_product(40, None, None)
                    .with_color(1, 40, "Red")
                    .with_size(10, 1, "M"),
            ),
            f.clock.clone(),
        )
        .with_config(InventoryConfig {
            low_stock_threshold: 10,
            ..InventoryConfig::default()
        });
        let record = service
            .add_lot(
                AddLot {
                    variant: red_m(),
                    warehouse_id: WarehouseId::new(W1),
                    quantity: 8,
                    lot_serial: None,
                },
                &actor(),
            )
            .await
            .unwrap();
        assert!(record.lot_serial.starts_with("PRD-MAR-RE"));
        let view = service.view(record);
        assert_eq!(view.availability, stockledger_inventory::Availability::LowStock);
        assert_eq!(service.get_low_stock(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sale_numbers_feed_sale_references() {
        let f = setup();
        seed(&f, W1, 3).await;
        let numbers = CorrelativeService::new(InMemorySequenceAllocator::new(), f.clock.clone());

        let number = numbers.next_dated("V").await.unwrap();
        assert_eq!(number, "V-20240501-0001");
        let entries = f
            .service
            .consume_for_sale(red_m(), 1, &SaleRef::new(SaleId::new(1), number), &actor())
            .await
            .unwrap();
        assert_eq!(entries[0].reference, "Sale #V-20240501-0001");
        assert_eq!(numbers.next_dated("V").await.unwrap(), "V-20240501-0002");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sequence_values_never_repeat_under_concurrency() {
        let allocator = Arc::new(InMemorySequenceAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::with_capacity(50);
                for _ in 0..50 {
                    seen.push(allocator.next("ticket").await.unwrap());
                }
                seen
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            let seen = handle.await.unwrap();
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
            for value in seen {
                assert!(all.insert(value));
            }
        }
        assert_eq!(all.len(), 400);
        assert_eq!(all.iter().copied().max(), Some(400));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Transfer { from: usize, to: i64, quantity: i64 },
        Consume(i64),
        Reverse(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3, 1i64..=3, 0i64..8).prop_map(|(from, to, quantity)| Op::Transfer {
                from,
                to,
                quantity
            }),
            (0i64..12).prop_map(Op::Consume),
            (1i64..6).prop_map(Op::Reverse),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: any sequence of transfers, sales and reversals keeps every record
        /// non-negative and moves the aggregate by exactly what was sold or returned.
        #[test]
        fn random_operations_conserve_stock(
            seeds in prop::collection::vec(1i64..10, 1..3),
            ops in prop::collection::vec(op_strategy(), 1..25),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let f = setup();
                let mut ids = Vec::new();
                for (i, qty) in seeds.iter().enumerate() {
                    ids.push(seed(&f, i as i64 + 1, *qty).await);
                }
                let mut expected: i64 = seeds.iter().sum();

                for (n, op) in ops.iter().enumerate() {
                    let before = f.service.list_all().await.unwrap();
                    let result = match op {
                        Op::Transfer { from, to, quantity } => {
                            let origin = ids[*from % ids.len()];
                            f.service
                                .transfer(origin, WarehouseId::new(*to), *quantity, &actor())
                                .await
                                .map(|_| 0)
                        }
                        Op::Consume(q) => f
                            .service
                            .consume_for_sale(red_m(), *q, &sale(n as i64), &actor())
                            .await
                            .map(|_| -q),
                        Op::Reverse(q) => f
                            .service
                            .reverse_for_annulment(red_m(), *q, &sale(n as i64), &actor())
                            .await
                            .map(|_| *q),
                    };
                    f.clock.advance(Duration::seconds(1));

                    let after = f.service.list_all().await.unwrap();
                    match result {
                        Ok(delta) => expected += delta,
                        Err(_) => prop_assert_eq!(&before, &after),
                    }
                    prop_assert!(after.iter().all(|r| r.quantity >= 0));
                    prop_assert_eq!(
                        f.service.get_available_for_variant(red_m()).await.unwrap(),
                        expected
                    );
                }
                Ok(())
            })?;
        }
    }
}
