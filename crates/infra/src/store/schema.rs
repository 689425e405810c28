//! Relational schema for the stock store and the sequence allocator.
//!
//! Ledger rows carry plain record ids without foreign keys: deleting a stock record
//! keeps every movement that referenced it. One record per variant and warehouse is
//! checked by the inventory service; the index on that tuple is not unique.

use sqlx::PgPool;
use tracing::instrument;

use super::r#trait::StoreError;

pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stock_records (
        id            BIGSERIAL PRIMARY KEY,
        product_id    BIGINT NOT NULL,
        color_id      BIGINT NOT NULL,
        size_id       BIGINT NOT NULL,
        warehouse_id  BIGINT NOT NULL,
        quantity      BIGINT NOT NULL,
        lot_serial    TEXT NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL,
        updated_at    TIMESTAMPTZ NOT NULL,
        CONSTRAINT stock_records_quantity_check CHECK (quantity >= 0),
        CONSTRAINT stock_records_lot_serial_key UNIQUE (lot_serial)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS stock_records_warehouse_idx
        ON stock_records (product_id, color_id, size_id, warehouse_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS stock_records_variant_idx
        ON stock_records (product_id, color_id, size_id, created_at, id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movement_entries (
        id                     BIGSERIAL PRIMARY KEY,
        source_record_id       BIGINT NOT NULL,
        destination_record_id  BIGINT,
        quantity               BIGINT NOT NULL,
        kind                   TEXT NOT NULL,
        sale_id                BIGINT,
        reference              TEXT NOT NULL,
        description            TEXT NOT NULL,
        acting_user            TEXT NOT NULL,
        recorded_at            TIMESTAMPTZ NOT NULL,
        CONSTRAINT movement_entries_kind_check
            CHECK (kind IN ('ENTRADA', 'SALIDA', 'AJUSTE', 'TRASLADO'))
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS movement_entries_source_idx
        ON movement_entries (source_record_id, recorded_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sequence_counters (
        scope       TEXT PRIMARY KEY,
        next_value  BIGINT NOT NULL CHECK (next_value >= 1)
    )
    "#,
];

/// Create missing tables and indexes. Safe to call on every start.
#[instrument(skip(pool), err)]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA.iter().copied() {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Database(format!("schema setup failed: {e}")))?;
    }
    Ok(())
}
