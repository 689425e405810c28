//! Durable counter rows in `sequence_counters`.
//!
//! Each `next()` is a single atomic upsert, so concurrent callers in any number of
//! processes never observe the same value for one scope.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use super::{SequenceAllocator, SequenceError, check_scope};

#[derive(Debug, Clone)]
pub struct PostgresSequenceAllocator {
    pool: Arc<PgPool>,
}

impl PostgresSequenceAllocator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn store_next_value(&self, scope: &str, next_value: i64) -> Result<(), SequenceError> {
        sqlx::query(
            "INSERT INTO sequence_counters (scope, next_value) VALUES ($1, $2) \
             ON CONFLICT (scope) DO UPDATE SET next_value = EXCLUDED.next_value",
        )
        .bind(scope)
        .bind(next_value)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("store_next_value", e))?;
        Ok(())
    }
}

#[async_trait]
impl SequenceAllocator for PostgresSequenceAllocator {
    #[instrument(skip(self), err)]
    async fn next(&self, scope: &str) -> Result<u64, SequenceError> {
        let scope = check_scope(scope)?;
        let value: i64 = sqlx::query_scalar(
            "INSERT INTO sequence_counters (scope, next_value) VALUES ($1, 2) \
             ON CONFLICT (scope) DO UPDATE SET next_value = sequence_counters.next_value + 1 \
             RETURNING next_value - 1",
        )
        .bind(scope)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("next", e))?;
        u64::try_from(value).map_err(|_| SequenceError::Exhausted(scope.to_string()))
    }

    #[instrument(skip(self), err)]
    async fn reset(&self, scope: &str) -> Result<(), SequenceError> {
        let scope = check_scope(scope)?;
        self.store_next_value(scope, 1).await
    }

    #[instrument(skip(self), err)]
    async fn set(&self, scope: &str, value: u64) -> Result<(), SequenceError> {
        let scope = check_scope(scope)?;
        if value == 0 {
            return Err(SequenceError::InvalidValue(value));
        }
        let value = i64::try_from(value).map_err(|_| SequenceError::InvalidValue(value))?;
        self.store_next_value(scope, value).await
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SequenceError {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("22003") => {
            SequenceError::Exhausted(format!("numeric overflow in {operation}"))
        }
        other => SequenceError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}
