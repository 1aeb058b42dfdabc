use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::cache::{CounterStore, StoreError, WindowCount};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rate_limit_counters (
    key TEXT PRIMARY KEY,
    count BIGINT NOT NULL,
    reset_at TIMESTAMPTZ NOT NULL
)
"#;

// 单条语句完成“过期则重置、否则加一”，并发请求由行锁串行化
const INCREMENT: &str = r#"
INSERT INTO rate_limit_counters (key, count, reset_at)
VALUES ($1, 1, now() + make_interval(secs => $2))
ON CONFLICT (key) DO UPDATE SET
    count = CASE
        WHEN rate_limit_counters.reset_at <= now() THEN 1
        ELSE rate_limit_counters.count + 1
    END,
    reset_at = CASE
        WHEN rate_limit_counters.reset_at <= now() THEN EXCLUDED.reset_at
        ELSE rate_limit_counters.reset_at
    END
RETURNING count, reset_at
"#;

const PURGE: &str = "DELETE FROM rate_limit_counters WHERE reset_at <= now()";

/// 基于 Postgres 表的计数器
pub struct PostgresCounterStore {
    pool: PgPool,
}

impl PostgresCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let (count, reset_at): (i64, DateTime<Utc>) = sqlx::query_as(INCREMENT)
            .bind(key)
            .bind(window.as_secs_f64())
            .fetch_one(&self.pool)
            .await?;

        if count < 1 {
            return Err(StoreError::Corrupt(format!("{} returned count {}", key, count)));
        }

        Ok(WindowCount {
            count: count as u64,
            reset_at,
        })
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(PURGE).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
