use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::{Client as RedisClient, Script};

use crate::cache::{CounterStore, StoreError, WindowCount};

// INCR 和设置过期时间放在同一个脚本里执行，避免进程在两条命令之间退出后留下永不过期的计数器
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

/// 基于 Redis 的计数器
pub struct RedisCounterStore {
    redis: Arc<RedisClient>,
    script: Script,
}

impl RedisCounterStore {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self {
            redis,
            script: Script::new(INCREMENT_SCRIPT),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let window_ms = window.as_millis().max(1) as u64;
        let (count, ttl_ms): (i64, i64) = self
            .script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        if count < 1 {
            return Err(StoreError::Corrupt(format!("{} returned count {}", key, count)));
        }

        Ok(WindowCount {
            count: count as u64,
            reset_at: Utc::now() + chrono::Duration::milliseconds(ttl_ms.max(0)),
        })
    }
}
