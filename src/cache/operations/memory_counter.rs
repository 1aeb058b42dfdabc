use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cache::{CounterStore, StoreError, WindowCount};

struct Entry {
    count: u64,
    expires_at: Instant,
}

/// 进程内计数器，仅用于本地开发和测试。
/// 多实例部署时每个实例各自计数，生产环境应使用 Redis 或 Postgres。
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: now + window,
        });
        // 窗口已结束，从当前请求开始新窗口
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + window;
        }
        entry.count += 1;

        let remaining = entry.expires_at.saturating_duration_since(now);
        let reset_at = Utc::now()
            + chrono::Duration::from_std(remaining)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(WindowCount {
            count: entry.count,
            reset_at,
        })
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn counts_within_window_and_resets_after() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);

        assert_eq!(store.increment("k", window).await.unwrap().count, 1);
        assert_eq!(store.increment("k", window).await.unwrap().count, 2);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.increment("k", window).await.unwrap().count, 3);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.increment("k", window).await.unwrap().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(10);
        store.increment("a", window).await.unwrap();
        store.increment("a", window).await.unwrap();
        assert_eq!(store.increment("b", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn concurrent_increments_never_share_a_count() {
        let store = Arc::new(MemoryCounterStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .increment("shared", Duration::from_secs(60))
                    .await
                    .unwrap()
                    .count
            }));
        }
        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=50).collect::<Vec<u64>>());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired_entries() {
        let store = MemoryCounterStore::new();
        store.increment("short", Duration::from_secs(1)).await.unwrap();
        store.increment("long", Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.increment("long", Duration::from_secs(100)).await.unwrap().count, 2);
    }
}
