// 限流计数器缓存
// 计数器存放在外部存储中，进程内只持有连接句柄

pub mod keys;
pub mod models;
pub mod operations;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use models::rate_limit::WindowCount;
pub use operations::{MemoryCounterStore, PostgresCounterStore, RedisCounterStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unexpected counter state: {0}")]
    Corrupt(String),
}

/// 固定窗口计数器。
///
/// `increment` 必须在存储端原子完成：窗口内第一次调用创建计数器并设置过期时间，
/// 同一个 key 的并发调用各自拿到不同的计数值。
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError>;

    /// 清理已过期的计数器，返回删除的条数。自带 TTL 的存储不需要实现。
    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}
