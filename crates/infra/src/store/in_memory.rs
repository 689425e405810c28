use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockledger_core::{MovementId, ProductId, StockRecordId, WarehouseId};
use stockledger_inventory::{
    MovementEntry, NewMovement, NewStockRecord, StockRecord, Variant, fifo_order,
};

use super::query::{MovementFilter, Page, PageRequest, StockSummary};
use super::r#trait::{
    LOT_SERIAL_CONSTRAINT, StockStore, StockTransaction, StoreError,
};

#[derive(Debug, Default)]
struct Tables {
    records: BTreeMap<StockRecordId, StockRecord>,
    movements: BTreeMap<MovementId, MovementEntry>,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    record_seq: AtomicI64,
    movement_seq: AtomicI64,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }
}

/// In-memory stock store.
///
/// Intended for tests/dev. Transactions buffer their writes and publish them at
/// `commit()`; reads see committed state overlaid with the transaction's own writes
/// (read-committed). Quantity writes are absolute, so two transactions that read the
/// same record and both commit produce a lost update, just like a relational store at
/// its default isolation without row locks.
///
/// [`InMemoryStockStore::serialized`] builds a store whose transactions run one at a
/// time, which removes that anomaly.
#[derive(Debug, Clone)]
pub struct InMemoryStockStore {
    shared: Arc<Shared>,
    gate: Option<Arc<Mutex<()>>>,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                record_seq: AtomicI64::new(1),
                movement_seq: AtomicI64::new(1),
            }),
            gate: None,
        }
    }

    /// Store whose transactions hold an exclusive gate from `begin()` until they end.
    pub fn serialized() -> Self {
        Self {
            gate: Some(Arc::new(Mutex::new(()))),
            ..Self::new()
        }
    }

    pub fn committed_records(&self) -> Result<Vec<StockRecord>, StoreError> {
        Ok(self.shared.read()?.records.values().cloned().collect())
    }

    pub fn committed_movements(&self) -> Result<Vec<MovementEntry>, StoreError> {
        Ok(self.shared.read()?.movements.values().cloned().collect())
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let gate = match &self.gate {
            Some(gate) => Some(gate.clone().lock_owned().await),
            None => None,
        };
        Ok(InMemoryTransaction {
            shared: self.shared.clone(),
            _gate: gate,
            written: BTreeMap::new(),
            inserted: BTreeSet::new(),
            deleted: BTreeSet::new(),
            appended: BTreeMap::new(),
        })
    }
}

/// Unit of work over an [`InMemoryStockStore`]. Dropping it discards its writes.
#[derive(Debug)]
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    _gate: Option<OwnedMutexGuard<()>>,
    written: BTreeMap<StockRecordId, StockRecord>,
    inserted: BTreeSet<StockRecordId>,
    deleted: BTreeSet<StockRecordId>,
    appended: BTreeMap<MovementId, MovementEntry>,
}

impl InMemoryTransaction {
    fn visible(&self, id: StockRecordId) -> Result<Option<StockRecord>, StoreError> {
        if self.deleted.contains(&id) {
            return Ok(None);
        }
        if let Some(record) = self.written.get(&id) {
            return Ok(Some(record.clone()));
        }
        Ok(self.shared.read()?.records.get(&id).cloned())
    }

    fn visible_records(&self) -> Result<BTreeMap<StockRecordId, StockRecord>, StoreError> {
        let mut merged: BTreeMap<StockRecordId, StockRecord> = {
            let tables = self.shared.read()?;
            tables
                .records
                .iter()
                .filter(|(id, _)| !self.deleted.contains(id))
                .map(|(id, r)| (*id, r.clone()))
                .collect()
        };
        for (id, record) in &self.written {
            merged.insert(*id, record.clone());
        }
        Ok(merged)
    }

    fn select(&self, keep: impl Fn(&StockRecord) -> bool) -> Result<Vec<StockRecord>, StoreError> {
        Ok(self
            .visible_records()?
            .into_values()
            .filter(|r| keep(r))
            .collect())
    }

    fn visible_movements(&self) -> Result<Vec<MovementEntry>, StoreError> {
        let mut movements: Vec<MovementEntry> =
            self.shared.read()?.movements.values().cloned().collect();
        movements.extend(self.appended.values().cloned());
        Ok(movements)
    }
}

fn conflict(existing: &StockRecord, candidate: &StockRecord) -> Option<StoreError> {
    if existing.id == candidate.id {
        return None;
    }
    if existing.lot_serial == candidate.lot_serial {
        return Some(StoreError::UniqueViolation {
            constraint: LOT_SERIAL_CONSTRAINT.to_string(),
            detail: candidate.lot_serial.clone(),
        });
    }
    None
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn insert_record(&mut self, record: NewStockRecord) -> Result<StockRecord, StoreError> {
        if record.quantity < 0 {
            return Err(StoreError::CheckViolation("stock_records_quantity_check".into()));
        }
        let id = StockRecordId::new(self.shared.record_seq.fetch_add(1, Ordering::SeqCst));
        let record = record.into_record(id);

        for existing in self.visible_records()?.values() {
            if let Some(err) = conflict(existing, &record) {
                return Err(err);
            }
        }

        self.inserted.insert(id);
        self.written.insert(id, record.clone());
        Ok(record)
    }

    async fn record(&mut self, id: StockRecordId) -> Result<Option<StockRecord>, StoreError> {
        self.visible(id)
    }

    async fn record_by_serial(&mut self, serial: &str) -> Result<Option<StockRecord>, StoreError> {
        Ok(self.select(|r| r.lot_serial == serial)?.into_iter().next())
    }

    async fn records_by_variant(
        &mut self,
        variant: &Variant,
    ) -> Result<Vec<StockRecord>, StoreError> {
        let records = self.select(|r| r.holds(variant))?;
        Ok(fifo_order(&records).into_iter().cloned().collect())
    }

    async fn record_in_warehouse(
        &mut self,
        variant: &Variant,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockRecord>, StoreError> {
        Ok(self
            .select(|r| r.holds(variant) && r.warehouse_id == warehouse_id)?
            .into_iter()
            .next())
    }

    async fn records_by_warehouse(
        &mut self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockRecord>, StoreError> {
        self.select(|r| r.warehouse_id == warehouse_id)
    }

    async fn records_by_product(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<StockRecord>, StoreError> {
        self.select(|r| r.variant.product_id == product_id)
    }

    async fn low_stock(&mut self, threshold: i64) -> Result<Vec<StockRecord>, StoreError> {
        self.select(|r| r.quantity <= threshold)
    }

    async fn all_records(&mut self) -> Result<Vec<StockRecord>, StoreError> {
        self.select(|_| true)
    }

    async fn sum_for_product(&mut self, product_id: ProductId) -> Result<i64, StoreError> {
        Ok(self
            .select(|r| r.variant.product_id == product_id)?
            .iter()
            .map(|r| r.quantity)
            .sum())
    }

    async fn sum_for_variant(&mut self, variant: &Variant) -> Result<i64, StoreError> {
        Ok(self
            .select(|r| r.holds(variant))?
            .iter()
            .map(|r| r.quantity)
            .sum())
    }

    async fn summary(&mut self, low_stock_threshold: i64) -> Result<StockSummary, StoreError> {
        let records = self.visible_records()?;
        Ok(StockSummary::tally(records.values(), low_stock_threshold))
    }

    async fn update_quantity(
        &mut self,
        id: StockRecordId,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> Result<StockRecord, StoreError> {
        if quantity < 0 {
            return Err(StoreError::CheckViolation("stock_records_quantity_check".into()));
        }
        let current = self.visible(id)?.ok_or(StoreError::MissingRecord(id))?;
        let updated = current.with_quantity(quantity, at);
        self.written.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_record(&mut self, id: StockRecordId) -> Result<bool, StoreError> {
        if self.visible(id)?.is_none() {
            return Ok(false);
        }
        self.written.remove(&id);
        self.inserted.remove(&id);
        self.deleted.insert(id);
        Ok(true)
    }

    async fn append_movement(
        &mut self,
        movement: NewMovement,
    ) -> Result<MovementEntry, StoreError> {
        let id = MovementId::new(self.shared.movement_seq.fetch_add(1, Ordering::SeqCst));
        let entry = movement.into_entry(id);
        self.appended.insert(id, entry.clone());
        Ok(entry)
    }

    async fn movement(&mut self, id: MovementId) -> Result<Option<MovementEntry>, StoreError> {
        if let Some(entry) = self.appended.get(&id) {
            return Ok(Some(entry.clone()));
        }
        Ok(self.shared.read()?.movements.get(&id).cloned())
    }

    async fn query_movements(
        &mut self,
        filter: &MovementFilter,
        page: &PageRequest,
    ) -> Result<Page<MovementEntry>, StoreError> {
        let records = if filter.needs_source_record() {
            self.visible_records()?
        } else {
            BTreeMap::new()
        };
        let mut matching: Vec<MovementEntry> = self
            .visible_movements()?
            .into_iter()
            .filter(|e| filter.matches(e, records.get(&e.source_record_id)))
            .collect();
        matching.sort_by(|a, b| page.compare(a, b));
        Ok(Page::slice(matching, page))
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut tables = self
            .shared
            .tables
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;

        // Inserts race with other committed inserts; re-check lot serial uniqueness
        // against what is committed now.
        for id in &self.inserted {
            let Some(candidate) = self.written.get(id) else {
                continue;
            };
            for existing in tables.records.values() {
                if self.deleted.contains(&existing.id) {
                    continue;
                }
                if let Some(err) = conflict(existing, candidate) {
                    return Err(err);
                }
            }
        }

        for (id, record) in &self.written {
            // An update to a record deleted by a concurrent commit is dropped.
            if self.inserted.contains(id) || tables.records.contains_key(id) {
                tables.records.insert(*id, record.clone());
            }
        }
        for id in &self.deleted {
            tables.records.remove(id);
        }
        for (id, entry) in &self.appended {
            tables.movements.insert(*id, entry.clone());
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
