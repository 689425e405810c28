//! Postgres-backed stock store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` (carries the constraint name) |
//! | Database (check constraint violation) | `23514` | `CheckViolation` |
//! | Database (other) | Any other | `Database` |
//! | Other | N/A | `Database` |
//!
//! ## Isolation
//!
//! Transactions run at the database default (read committed) and do not lock rows they
//! read. Quantity updates write absolute values computed from the earlier read.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;

use stockledger_core::{
    ColorId, MovementId, ProductId, SaleId, SizeId, StockRecordId, WarehouseId,
};
use stockledger_inventory::{
    MovementEntry, MovementKind, NewMovement, NewStockRecord, StockRecord, Variant,
};

use super::query::{MovementFilter, MovementSortField, Page, PageRequest, StockSummary};
use super::r#trait::{StockStore, StockTransaction, StoreError};
use super::schema;

const RECORD_COLUMNS: &str = "id, product_id, color_id, size_id, warehouse_id, quantity, \
                              lot_serial, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "m.id, m.source_record_id, m.destination_record_id, m.quantity, \
                                m.kind, m.sale_id, m.reference, m.description, m.acting_user, \
                                m.recorded_at";

#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        schema::ensure_schema(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Tx = PostgresTransaction;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PostgresTransaction { tx })
    }
}

/// Unit of work over a Postgres connection. Dropping it rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn fetch_records(
        &mut self,
        operation: &str,
        mut query: QueryBuilder<'_, Postgres>,
    ) -> Result<Vec<StockRecord>, StoreError> {
        let rows = query
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(record_from_row).collect()
    }
}

fn select_records<'a>() -> QueryBuilder<'a, Postgres> {
    QueryBuilder::new(format!("SELECT {RECORD_COLUMNS} FROM stock_records WHERE TRUE"))
}

fn push_variant(query: &mut QueryBuilder<'_, Postgres>, variant: &Variant) {
    query
        .push(" AND product_id = ")
        .push_bind(variant.product_id.get())
        .push(" AND color_id = ")
        .push_bind(variant.color_id.get())
        .push(" AND size_id = ")
        .push_bind(variant.size_id.get());
}

fn push_movement_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &MovementFilter) {
    if let Some(id) = filter.stock_record_id {
        query.push(" AND m.source_record_id = ").push_bind(id.get());
    }
    if let Some(kind) = filter.kind {
        query.push(" AND m.kind = ").push_bind(kind.as_str());
    }
    if let Some(from) = filter.from {
        query.push(" AND m.recorded_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND m.recorded_at <= ").push_bind(to);
    }
    if let Some(product) = filter.product_id {
        query.push(" AND r.product_id = ").push_bind(product.get());
    }
    if let Some(color) = filter.color_id {
        query.push(" AND r.color_id = ").push_bind(color.get());
    }
    if let Some(size) = filter.size_id {
        query.push(" AND r.size_id = ").push_bind(size.get());
    }
}

fn sort_column(field: MovementSortField) -> &'static str {
    match field {
        MovementSortField::Timestamp => "m.recorded_at",
        MovementSortField::Quantity => "m.quantity",
        MovementSortField::Kind => "m.kind",
        MovementSortField::Id => "m.id",
    }
}

#[async_trait]
impl StockTransaction for PostgresTransaction {
    #[instrument(skip(self, record), fields(warehouse_id = %record.warehouse_id), err)]
    async fn insert_record(&mut self, record: NewStockRecord) -> Result<StockRecord, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO stock_records \
             (product_id, color_id, size_id, warehouse_id, quantity, lot_serial, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(record.variant.product_id.get())
        .bind(record.variant.color_id.get())
        .bind(record.variant.size_id.get())
        .bind(record.warehouse_id.get())
        .bind(record.quantity)
        .bind(&record.lot_serial)
        .bind(record.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_record", e))?;
        record_from_row(&row)
    }

    async fn record(&mut self, id: StockRecordId) -> Result<Option<StockRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("record", e))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn record_by_serial(&mut self, serial: &str) -> Result<Option<StockRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE lot_serial = $1"
        ))
        .bind(serial)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("record_by_serial", e))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn records_by_variant(
        &mut self,
        variant: &Variant,
    ) -> Result<Vec<StockRecord>, StoreError> {
        let mut query = select_records();
        push_variant(&mut query, variant);
        query.push(" ORDER BY created_at ASC, id ASC");
        self.fetch_records("records_by_variant", query).await
    }

    async fn record_in_warehouse(
        &mut self,
        variant: &Variant,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockRecord>, StoreError> {
        let mut query = select_records();
        push_variant(&mut query, variant);
        query
            .push(" AND warehouse_id = ")
            .push_bind(warehouse_id.get())
            .push(" ORDER BY created_at ASC, id ASC LIMIT 1");
        Ok(self
            .fetch_records("record_in_warehouse", query)
            .await?
            .into_iter()
            .next())
    }

    async fn records_by_warehouse(
        &mut self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockRecord>, StoreError> {
        let mut query = select_records();
        query
            .push(" AND warehouse_id = ")
            .push_bind(warehouse_id.get())
            .push(" ORDER BY id");
        self.fetch_records("records_by_warehouse", query).await
    }

    async fn records_by_product(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<StockRecord>, StoreError> {
        let mut query = select_records();
        query
            .push(" AND product_id = ")
            .push_bind(product_id.get())
            .push(" ORDER BY id");
        self.fetch_records("records_by_product", query).await
    }

    async fn low_stock(&mut self, threshold: i64) -> Result<Vec<StockRecord>, StoreError> {
        let mut query = select_records();
        query
            .push(" AND quantity <= ")
            .push_bind(threshold)
            .push(" ORDER BY id");
        self.fetch_records("low_stock", query).await
    }

    async fn all_records(&mut self) -> Result<Vec<StockRecord>, StoreError> {
        let mut query = select_records();
        query.push(" ORDER BY id");
        self.fetch_records("all_records", query).await
    }

    async fn sum_for_product(&mut self, product_id: ProductId) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM stock_records WHERE product_id = $1",
        )
        .bind(product_id.get())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("sum_for_product", e))
    }

    async fn sum_for_variant(&mut self, variant: &Variant) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM stock_records \
             WHERE product_id = $1 AND color_id = $2 AND size_id = $3",
        )
        .bind(variant.product_id.get())
        .bind(variant.color_id.get())
        .bind(variant.size_id.get())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("sum_for_variant", e))
    }

    async fn summary(&mut self, low_stock_threshold: i64) -> Result<StockSummary, StoreError> {
        let (records, depleted, low_stock, total_units) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                "SELECT COUNT(*)::BIGINT, \
                        COUNT(*) FILTER (WHERE quantity <= 0)::BIGINT, \
                        COUNT(*) FILTER (WHERE quantity > 0 AND quantity <= $1)::BIGINT, \
                        COALESCE(SUM(quantity), 0)::BIGINT \
                 FROM stock_records",
            )
            .bind(low_stock_threshold)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("summary", e))?;
        Ok(StockSummary {
            records: records.max(0) as u64,
            depleted: depleted.max(0) as u64,
            low_stock: low_stock.max(0) as u64,
            total_units,
        })
    }

    #[instrument(skip(self), fields(record_id = %id), err)]
    async fn update_quantity(
        &mut self,
        id: StockRecordId,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> Result<StockRecord, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE stock_records SET quantity = $2, updated_at = $3 WHERE id = $1 \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(id.get())
        .bind(quantity)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_quantity", e))?;
        match row {
            Some(row) => record_from_row(&row),
            None => Err(StoreError::MissingRecord(id)),
        }
    }

    async fn delete_record(&mut self, id: StockRecordId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM stock_records WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_record", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(
        skip(self, movement),
        fields(source = %movement.source_record_id, kind = %movement.kind),
        err
    )]
    async fn append_movement(
        &mut self,
        movement: NewMovement,
    ) -> Result<MovementEntry, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO movement_entries \
             (source_record_id, destination_record_id, quantity, kind, sale_id, reference, \
              description, acting_user, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(movement.source_record_id.get())
        .bind(movement.destination_record_id.map(StockRecordId::get))
        .bind(movement.quantity)
        .bind(movement.kind.as_str())
        .bind(movement.sale_id.map(SaleId::get))
        .bind(&movement.reference)
        .bind(&movement.description)
        .bind(&movement.acting_user)
        .bind(movement.recorded_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;
        Ok(movement.into_entry(MovementId::new(id)))
    }

    async fn movement(&mut self, id: MovementId) -> Result<Option<MovementEntry>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movement_entries m WHERE m.id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("movement", e))?;
        row.as_ref().map(movement_from_row).transpose()
    }

    #[instrument(skip(self, filter), fields(page = page.page, size = page.size), err)]
    async fn query_movements(
        &mut self,
        filter: &MovementFilter,
        page: &PageRequest,
    ) -> Result<Page<MovementEntry>, StoreError> {
        let join = if filter.needs_source_record() {
            " JOIN stock_records r ON r.id = m.source_record_id"
        } else {
            ""
        };

        let mut count = QueryBuilder::<Postgres>::new(format!(
            "SELECT COUNT(*) FROM movement_entries m{join} WHERE TRUE"
        ));
        push_movement_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let direction = page.direction.as_sql();
        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movement_entries m{join} WHERE TRUE"
        ));
        push_movement_filter(&mut select, filter);
        select
            .push(format!(
                " ORDER BY {} {direction}, m.id {direction}",
                sort_column(page.sort_by)
            ))
            .push(" LIMIT ")
            .push_bind(page.size)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("query_movements", e))?;

        let content = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(content, page, total.max(0) as u64))
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn record_from_row(row: &PgRow) -> Result<StockRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Corrupt(format!("stock record row: {e}"));
    Ok(StockRecord {
        id: StockRecordId::new(row.try_get("id").map_err(decode)?),
        variant: Variant::new(
            ProductId::new(row.try_get("product_id").map_err(decode)?),
            ColorId::new(row.try_get("color_id").map_err(decode)?),
            SizeId::new(row.try_get("size_id").map_err(decode)?),
        ),
        warehouse_id: WarehouseId::new(row.try_get("warehouse_id").map_err(decode)?),
        quantity: row.try_get("quantity").map_err(decode)?,
        lot_serial: row.try_get("lot_serial").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<MovementEntry, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Corrupt(format!("movement row: {e}"));
    let kind: String = row.try_get("kind").map_err(decode)?;
    let kind: MovementKind = kind
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("movement row: {e}")))?;
    let destination: Option<i64> = row.try_get("destination_record_id").map_err(decode)?;
    let sale: Option<i64> = row.try_get("sale_id").map_err(decode)?;
    Ok(MovementEntry {
        id: MovementId::new(row.try_get("id").map_err(decode)?),
        source_record_id: StockRecordId::new(row.try_get("source_record_id").map_err(decode)?),
        destination_record_id: destination.map(StockRecordId::new),
        quantity: row.try_get("quantity").map_err(decode)?,
        kind,
        sale_id: sale.map(SaleId::new),
        reference: row.try_get("reference").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        acting_user: row.try_get("acting_user").map_err(decode)?,
        recorded_at: row.try_get("recorded_at").map_err(decode)?,
    })
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                    detail: msg,
                },
                Some("23514") => StoreError::CheckViolation(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}
