//! Inventory orchestration inside one unit of work.
//!
//! Every public mutation opens a transaction, runs its `*_in` counterpart and commits
//! on success or rolls back on any error, so a failed operation never leaves a partial
//! mutation behind. The `*_in` variants let a caller compose several operations (for
//! example every line of one sale) into a single transaction.
//!
//! ## Isolation
//!
//! The service takes no locks of its own. `consume_for_sale` reads the aggregate and
//! then writes absolute quantities, so two concurrent sales of the same variant can both
//! pass the availability check and over-deplete stock unless the store serializes them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use stockledger_core::{
    DomainError, DomainResult, ErrorKind, MovementId, ProductId, SaleId, StockRecordId,
    WarehouseId,
};
use stockledger_inventory::{
    ActingUser, AddLot, MovementEntry, MovementKind, NewMovement, NewStockRecord,
    RegisterMovement, SaleRef, StockRecord, TransferDestination, Variant, ensure_positive,
    next_source_quantity, plan_depletion, validate_destination_record, validate_transfer,
};

use crate::collaborators::{Clock, ProductCatalog, WarehouseDirectory};
use crate::config::InventoryConfig;
use crate::mapping::StockRecordView;
use crate::serial::LotSerialGenerator;
use crate::store::{
    MovementFilter, Page, PageRequest, StockStore, StockSummary, StockTransaction,
};

/// Both ledger entries and both resulting records of one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub origin: StockRecord,
    pub destination: StockRecord,
    /// `TRASLADO` on the origin, pointing at the destination.
    pub outbound: MovementEntry,
    /// `ENTRADA` on the destination.
    pub inbound: MovementEntry,
}

struct TransferNote {
    reference: String,
    description: String,
    sale_id: Option<SaleId>,
}

async fn load_record<T: StockTransaction>(
    tx: &mut T,
    id: StockRecordId,
) -> DomainResult<StockRecord> {
    tx.record(id)
        .await?
        .ok_or_else(|| DomainError::not_found("stock record", id))
}

/// Commit on success, roll back on failure. The original error wins over a failed
/// rollback.
async fn finish<T, R>(tx: T, operation: &'static str, result: DomainResult<R>) -> DomainResult<R>
where
    T: StockTransaction,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            match err.kind() {
                ErrorKind::BusinessRule => warn!(operation, error = %err, "operation rejected"),
                ErrorKind::Internal => error!(operation, error = %err, "operation failed"),
                ErrorKind::NotFound | ErrorKind::Validation => {
                    debug!(operation, error = %err, "invalid request")
                }
            }
            if let Err(rollback) = tx.rollback().await {
                error!(operation, error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

pub struct InventoryService<S> {
    store: S,
    warehouses: Arc<dyn WarehouseDirectory>,
    catalog: Arc<dyn ProductCatalog>,
    clock: Arc<dyn Clock>,
    serials: LotSerialGenerator,
    config: InventoryConfig,
}

impl<S> InventoryService<S>
where
    S: StockStore,
{
    pub fn new(
        store: S,
        warehouses: Arc<dyn WarehouseDirectory>,
        catalog: Arc<dyn ProductCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = InventoryConfig::default();
        Self {
            store,
            warehouses,
            catalog,
            clock,
            serials: LotSerialGenerator::new(config.serial_attempts),
            config,
        }
    }

    pub fn with_config(mut self, config: InventoryConfig) -> Self {
        self.serials = LotSerialGenerator::new(config.serial_attempts);
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub async fn begin(&self) -> DomainResult<S::Tx> {
        Ok(self.store.begin().await?)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn ensure_warehouse(&self, id: WarehouseId) -> DomainResult<()> {
        if !self.warehouses.exists(id) {
            return Err(DomainError::not_found("warehouse", id));
        }
        Ok(())
    }

    fn ensure_product(&self, id: ProductId) -> DomainResult<()> {
        if !self.catalog.product_exists(id) {
            return Err(DomainError::not_found("product", id));
        }
        Ok(())
    }

    pub fn view(&self, record: StockRecord) -> StockRecordView {
        StockRecordView::new(record, self.config.low_stock_threshold)
    }

    async fn allocate_serial(&self, tx: &mut S::Tx, variant: &Variant) -> DomainResult<String> {
        let labels = self.catalog.labels(variant);
        let date = self.now().date_naive();
        let mut last = String::new();
        for attempt in 1..=self.serials.attempts() {
            let candidate = self.serials.candidate(labels.as_ref(), date);
            if tx.record_by_serial(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            debug!(attempt, serial = %candidate, "lot serial collision");
            last = candidate;
        }
        Err(DomainError::DuplicateSerial(last))
    }

    /// The variant's record in `warehouse_id`, created empty when missing.
    async fn destination_in_warehouse(
        &self,
        tx: &mut S::Tx,
        origin: &StockRecord,
        warehouse_id: WarehouseId,
    ) -> DomainResult<StockRecord> {
        if let Some(existing) = tx.record_in_warehouse(&origin.variant, warehouse_id).await? {
            debug!(record_id = %existing.id, "transfer into existing record");
            return Ok(existing);
        }
        let lot_serial = self.allocate_serial(tx, &origin.variant).await?;
        let created = tx
            .insert_record(NewStockRecord {
                variant: origin.variant,
                warehouse_id,
                quantity: 0,
                lot_serial,
                created_at: self.now(),
            })
            .await?;
        debug!(record_id = %created.id, serial = %created.lot_serial, "created destination record");
        Ok(created)
    }

    async fn move_stock(
        &self,
        tx: &mut S::Tx,
        origin: StockRecord,
        destination: StockRecord,
        quantity: i64,
        note: TransferNote,
        actor: &ActingUser,
    ) -> DomainResult<TransferOutcome> {
        let now = self.now();
        let origin_quantity = next_source_quantity(MovementKind::Transfer, origin.quantity, quantity)?;
        let destination_quantity =
            next_source_quantity(MovementKind::Inbound, destination.quantity, quantity)?;

        let origin = tx.update_quantity(origin.id, origin_quantity, now).await?;
        let destination = tx
            .update_quantity(destination.id, destination_quantity, now)
            .await?;

        let outbound = tx
            .append_movement(
                NewMovement::new(origin.id, MovementKind::Transfer, quantity, actor, now)
                    .destination(destination.id)
                    .sale(note.sale_id)
                    .reference(note.reference.clone())
                    .description(note.description),
            )
            .await?;
        let inbound = tx
            .append_movement(
                NewMovement::new(destination.id, MovementKind::Inbound, quantity, actor, now)
                    .sale(note.sale_id)
                    .reference(note.reference)
                    .description(format!("Transfer from stock record {}", origin.id)),
            )
            .await?;

        Ok(TransferOutcome {
            origin,
            destination,
            outbound,
            inbound,
        })
    }

    // ---- mutations -------------------------------------------------------------

    #[instrument(
        skip_all,
        fields(variant = %cmd.variant, warehouse_id = %cmd.warehouse_id, quantity = cmd.quantity)
    )]
    pub async fn add_lot(&self, cmd: AddLot, actor: &ActingUser) -> DomainResult<StockRecord> {
        let mut tx = self.begin().await?;
        let result = self.add_lot_in(&mut tx, cmd, actor).await;
        finish(tx, "add_lot", result).await
    }

    /// Seeds a new record. No ledger entry is written for the initial quantity.
    pub async fn add_lot_in(
        &self,
        tx: &mut S::Tx,
        cmd: AddLot,
        actor: &ActingUser,
    ) -> DomainResult<StockRecord> {
        self.catalog.validate_relationship(&cmd.variant)?;
        ensure_positive(cmd.quantity, "initial")?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        if tx
            .record_in_warehouse(&cmd.variant, cmd.warehouse_id)
            .await?
            .is_some()
        {
            return Err(DomainError::DuplicateVariant);
        }

        let lot_serial = match cmd.lot_serial {
            Some(serial) => {
                let serial = serial.trim().to_string();
                if serial.is_empty() {
                    return Err(DomainError::validation("lot serial cannot be blank"));
                }
                if tx.record_by_serial(&serial).await?.is_some() {
                    return Err(DomainError::DuplicateSerial(serial));
                }
                serial
            }
            None => self.allocate_serial(tx, &cmd.variant).await?,
        };

        let record = tx
            .insert_record(NewStockRecord {
                variant: cmd.variant,
                warehouse_id: cmd.warehouse_id,
                quantity: cmd.quantity,
                lot_serial,
                created_at: self.now(),
            })
            .await?;
        info!(record_id = %record.id, serial = %record.lot_serial, actor = %actor, "lot added");
        Ok(record)
    }

    #[instrument(
        skip_all,
        fields(record_id = %origin_id, destination_warehouse_id = %destination_warehouse_id, quantity = quantity)
    )]
    pub async fn transfer(
        &self,
        origin_id: StockRecordId,
        destination_warehouse_id: WarehouseId,
        quantity: i64,
        actor: &ActingUser,
    ) -> DomainResult<TransferOutcome> {
        let mut tx = self.begin().await?;
        let result = self
            .transfer_in(&mut tx, origin_id, destination_warehouse_id, quantity, actor)
            .await;
        finish(tx, "transfer", result).await
    }

    pub async fn transfer_in(
        &self,
        tx: &mut S::Tx,
        origin_id: StockRecordId,
        destination_warehouse_id: WarehouseId,
        quantity: i64,
        actor: &ActingUser,
    ) -> DomainResult<TransferOutcome> {
        let origin = load_record(tx, origin_id).await?;
        validate_transfer(&origin, destination_warehouse_id, quantity)?;
        self.ensure_warehouse(destination_warehouse_id)?;

        let destination = self
            .destination_in_warehouse(tx, &origin, destination_warehouse_id)
            .await?;
        let note = TransferNote {
            reference: format!("Transfer to warehouse {destination_warehouse_id}"),
            description: format!(
                "Transfer of {quantity} units from warehouse {} to warehouse {destination_warehouse_id}",
                origin.warehouse_id
            ),
            sale_id: None,
        };
        let outcome = self
            .move_stock(tx, origin, destination, quantity, note, actor)
            .await?;
        info!(
            origin_quantity = outcome.origin.quantity,
            destination_id = %outcome.destination.id,
            destination_quantity = outcome.destination.quantity,
            "stock transferred"
        );
        Ok(outcome)
    }

    #[instrument(skip_all, fields(variant = %variant, quantity = quantity, sale_id = %sale.id))]
    pub async fn consume_for_sale(
        &self,
        variant: Variant,
        quantity: i64,
        sale: &SaleRef,
        actor: &ActingUser,
    ) -> DomainResult<Vec<MovementEntry>> {
        let mut tx = self.begin().await?;
        let result = self
            .consume_for_sale_in(&mut tx, variant, quantity, sale, actor)
            .await;
        finish(tx, "consume_for_sale", result).await
    }

    /// FIFO depletion across every warehouse; one `SALIDA` per record touched.
    pub async fn consume_for_sale_in(
        &self,
        tx: &mut S::Tx,
        variant: Variant,
        quantity: i64,
        sale: &SaleRef,
        actor: &ActingUser,
    ) -> DomainResult<Vec<MovementEntry>> {
        let records = tx.records_by_variant(&variant).await?;
        let plan = plan_depletion(&records, quantity)?;

        let now = self.now();
        let mut entries = Vec::with_capacity(plan.len());
        for step in plan {
            debug!(
                record_id = %step.record_id,
                take = step.quantity,
                remaining = step.remaining,
                "fifo step"
            );
            tx.update_quantity(step.record_id, step.remaining, now).await?;
            let entry = tx
                .append_movement(
                    NewMovement::new(step.record_id, MovementKind::Outbound, step.quantity, actor, now)
                        .sale(Some(sale.id))
                        .reference(sale.sale_reference())
                        .description(format!("Sale of {} units", step.quantity)),
                )
                .await?;
            entries.push(entry);
        }
        info!(records_touched = entries.len(), "stock consumed for sale");
        Ok(entries)
    }

    #[instrument(skip_all, fields(variant = %variant, quantity = quantity, sale_id = %sale.id))]
    pub async fn reverse_for_annulment(
        &self,
        variant: Variant,
        quantity: i64,
        sale: &SaleRef,
        actor: &ActingUser,
    ) -> DomainResult<MovementEntry> {
        let mut tx = self.begin().await?;
        let result = self
            .reverse_for_annulment_in(&mut tx, variant, quantity, sale, actor)
            .await;
        finish(tx, "reverse_for_annulment", result).await
    }

    /// Credits the whole quantity to the oldest record of the variant.
    pub async fn reverse_for_annulment_in(
        &self,
        tx: &mut S::Tx,
        variant: Variant,
        quantity: i64,
        sale: &SaleRef,
        actor: &ActingUser,
    ) -> DomainResult<MovementEntry> {
        ensure_positive(quantity, "reversal")?;
        let oldest = tx
            .records_by_variant(&variant)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::not_found("stock record", variant))?;

        let now = self.now();
        let new_quantity = next_source_quantity(MovementKind::Inbound, oldest.quantity, quantity)?;
        let record = tx.update_quantity(oldest.id, new_quantity, now).await?;
        let entry = tx
            .append_movement(
                NewMovement::new(record.id, MovementKind::Inbound, quantity, actor, now)
                    .sale(Some(sale.id))
                    .reference(sale.annulment_reference())
                    .description("Return due to annulment"),
            )
            .await?;
        info!(record_id = %record.id, quantity = record.quantity, "sale reversed");
        Ok(entry)
    }

    #[instrument(
        skip_all,
        fields(record_id = %cmd.stock_record_id, kind = %cmd.kind, quantity = cmd.quantity)
    )]
    pub async fn register_movement(
        &self,
        cmd: RegisterMovement,
        actor: &ActingUser,
    ) -> DomainResult<MovementEntry> {
        let mut tx = self.begin().await?;
        let result = self.register_movement_in(&mut tx, cmd, actor).await;
        finish(tx, "register_movement", result).await
    }

    /// Applies one movement of any kind. For `Transfer` the returned entry is the
    /// origin side; the matching `ENTRADA` on the destination is appended as well.
    pub async fn register_movement_in(
        &self,
        tx: &mut S::Tx,
        cmd: RegisterMovement,
        actor: &ActingUser,
    ) -> DomainResult<MovementEntry> {
        let record = load_record(tx, cmd.stock_record_id).await?;

        if cmd.kind == MovementKind::Transfer {
            let destination = match cmd.destination {
                None => {
                    return Err(DomainError::validation(
                        "a transfer needs a destination record or warehouse",
                    ));
                }
                Some(TransferDestination::Record(id)) => {
                    next_source_quantity(MovementKind::Transfer, record.quantity, cmd.quantity)?;
                    let destination = load_record(tx, id).await?;
                    validate_destination_record(&record, &destination)?;
                    destination
                }
                Some(TransferDestination::Warehouse(warehouse_id)) => {
                    validate_transfer(&record, warehouse_id, cmd.quantity)?;
                    self.ensure_warehouse(warehouse_id)?;
                    self.destination_in_warehouse(tx, &record, warehouse_id)
                        .await?
                }
            };
            let note = TransferNote {
                reference: cmd.reference,
                description: cmd.description,
                sale_id: cmd.sale_id,
            };
            let outcome = self
                .move_stock(tx, record, destination, cmd.quantity, note, actor)
                .await?;
            info!(
                origin_quantity = outcome.origin.quantity,
                destination_id = %outcome.destination.id,
                "transfer movement registered"
            );
            return Ok(outcome.outbound);
        }

        let new_quantity = next_source_quantity(cmd.kind, record.quantity, cmd.quantity)?;
        let now = self.now();
        let updated = tx.update_quantity(record.id, new_quantity, now).await?;
        let entry = tx
            .append_movement(
                NewMovement::new(record.id, cmd.kind, cmd.quantity, actor, now)
                    .sale(cmd.sale_id)
                    .reference(cmd.reference)
                    .description(cmd.description),
            )
            .await?;
        info!(quantity = updated.quantity, movement_id = %entry.id, "movement registered");
        Ok(entry)
    }

    #[instrument(skip_all, fields(record_id = %id, new_quantity = new_quantity))]
    pub async fn adjust_stock(
        &self,
        id: StockRecordId,
        new_quantity: i64,
        actor: &ActingUser,
    ) -> DomainResult<StockRecord> {
        let mut tx = self.begin().await?;
        let result = self.adjust_stock_in(&mut tx, id, new_quantity, actor).await;
        finish(tx, "adjust_stock", result).await
    }

    /// Sets an absolute quantity and records it as an `AJUSTE`.
    pub async fn adjust_stock_in(
        &self,
        tx: &mut S::Tx,
        id: StockRecordId,
        new_quantity: i64,
        actor: &ActingUser,
    ) -> DomainResult<StockRecord> {
        let record = load_record(tx, id).await?;
        let quantity = next_source_quantity(MovementKind::Adjustment, record.quantity, new_quantity)?;
        let now = self.now();
        let updated = tx.update_quantity(id, quantity, now).await?;
        tx.append_movement(
            NewMovement::new(id, MovementKind::Adjustment, quantity, actor, now)
                .reference("Stock adjustment")
                .description(format!("Quantity set from {} to {}", record.quantity, quantity)),
        )
        .await?;
        info!(previous = record.quantity, quantity, "stock adjusted");
        Ok(updated)
    }

    #[instrument(skip_all, fields(record_id = %id))]
    pub async fn delete_stock_record(
        &self,
        id: StockRecordId,
        actor: &ActingUser,
    ) -> DomainResult<()> {
        let mut tx = self.begin().await?;
        let result = self.delete_stock_record_in(&mut tx, id, actor).await;
        finish(tx, "delete_stock_record", result).await
    }

    /// Removes the record; ledger entries that reference it are kept.
    pub async fn delete_stock_record_in(
        &self,
        tx: &mut S::Tx,
        id: StockRecordId,
        actor: &ActingUser,
    ) -> DomainResult<()> {
        if !tx.delete_record(id).await? {
            return Err(DomainError::not_found("stock record", id));
        }
        info!(actor = %actor, "stock record deleted");
        Ok(())
    }

    // ---- queries ---------------------------------------------------------------

    pub async fn get_by_id(&self, id: StockRecordId) -> DomainResult<StockRecord> {
        let mut tx = self.begin().await?;
        let result = load_record(&mut tx, id).await;
        finish(tx, "get_by_id", result).await
    }

    pub async fn get_by_serial(&self, serial: &str) -> DomainResult<StockRecord> {
        let mut tx = self.begin().await?;
        let result = match tx.record_by_serial(serial.trim()).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(DomainError::not_found("stock record", serial)),
            Err(e) => Err(e.into()),
        };
        finish(tx, "get_by_serial", result).await
    }

    /// Oldest first.
    pub async fn get_by_variant(&self, variant: Variant) -> DomainResult<Vec<StockRecord>> {
        self.catalog.validate_relationship(&variant)?;
        let mut tx = self.begin().await?;
        let result = tx.records_by_variant(&variant).await.map_err(DomainError::from);
        finish(tx, "get_by_variant", result).await
    }

    pub async fn get_by_warehouse(&self, warehouse_id: WarehouseId) -> DomainResult<Vec<StockRecord>> {
        self.ensure_warehouse(warehouse_id)?;
        let mut tx = self.begin().await?;
        let result = tx
            .records_by_warehouse(warehouse_id)
            .await
            .map_err(DomainError::from);
        finish(tx, "get_by_warehouse", result).await
    }

    pub async fn get_by_product(&self, product_id: ProductId) -> DomainResult<Vec<StockRecord>> {
        self.ensure_product(product_id)?;
        let mut tx = self.begin().await?;
        let result = tx
            .records_by_product(product_id)
            .await
            .map_err(DomainError::from);
        finish(tx, "get_by_product", result).await
    }

    /// Records with `quantity <= threshold`, depleted ones included; the configured
    /// threshold when `None`.
    pub async fn get_low_stock(&self, threshold: Option<i64>) -> DomainResult<Vec<StockRecord>> {
        let threshold = threshold.unwrap_or(self.config.low_stock_threshold);
        let mut tx = self.begin().await?;
        let result = tx.low_stock(threshold).await.map_err(DomainError::from);
        finish(tx, "get_low_stock", result).await
    }

    pub async fn get_total_for_product(&self, product_id: ProductId) -> DomainResult<i64> {
        self.ensure_product(product_id)?;
        let mut tx = self.begin().await?;
        let result = tx.sum_for_product(product_id).await.map_err(DomainError::from);
        finish(tx, "get_total_for_product", result).await
    }

    /// Aggregate quantity of a variant across every warehouse.
    pub async fn get_available_for_variant(&self, variant: Variant) -> DomainResult<i64> {
        self.catalog.validate_relationship(&variant)?;
        let mut tx = self.begin().await?;
        let result = tx.sum_for_variant(&variant).await.map_err(DomainError::from);
        finish(tx, "get_available_for_variant", result).await
    }

    pub async fn list_all(&self) -> DomainResult<Vec<StockRecord>> {
        let mut tx = self.begin().await?;
        let result = tx.all_records().await.map_err(DomainError::from);
        finish(tx, "list_all", result).await
    }

    pub async fn get_movement(&self, id: MovementId) -> DomainResult<MovementEntry> {
        let mut tx = self.begin().await?;
        let result = match tx.movement(id).await {
            Ok(Some(entry)) => Ok(entry),
            Ok(None) => Err(DomainError::not_found("movement", id)),
            Err(e) => Err(e.into()),
        };
        finish(tx, "get_movement", result).await
    }

    pub async fn list_movements(
        &self,
        filter: &MovementFilter,
        page: PageRequest,
    ) -> DomainResult<Page<MovementEntry>> {
        let page = page.clamped(self.config.page_size, self.config.max_page_size);
        let mut tx = self.begin().await?;
        let result = tx
            .query_movements(filter, &page)
            .await
            .map_err(DomainError::from);
        finish(tx, "list_movements", result).await
    }

    /// Newest first.
    pub async fn list_movements_for_record(
        &self,
        id: StockRecordId,
        page: i64,
        size: i64,
    ) -> DomainResult<Page<MovementEntry>> {
        let request = PageRequest {
            page,
            size,
            ..PageRequest::default()
        }
        .clamped(self.config.page_size, self.config.max_page_size);
        let mut tx = self.begin().await?;
        let result = match load_record(&mut tx, id).await {
            Ok(_) => tx
                .query_movements(&MovementFilter::for_record(id), &request)
                .await
                .map_err(DomainError::from),
            Err(e) => Err(e),
        };
        finish(tx, "list_movements_for_record", result).await
    }

    pub async fn stock_summary(&self, threshold: Option<i64>) -> DomainResult<StockSummary> {
        let threshold = threshold.unwrap_or(self.config.low_stock_threshold);
        let mut tx = self.begin().await?;
        let result = tx.summary(threshold).await.map_err(DomainError::from);
        finish(tx, "stock_summary", result).await
    }
}
