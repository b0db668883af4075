//! Moka LocalStore 实现

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache as MokaCache;
use std::time::{Duration, Instant};
use tandem_ports::LocalStore;

/// 缓存条目，携带自身的 TTL
///
/// Moka 的 time_to_live 是整缓存级别的，按条目 TTL
/// 需要把过期时长存进值里，由 Expiry 策略读取
#[derive(Debug, Clone)]
struct TtlEntry {
    value: String,
    ttl: Duration,
}

/// 按条目 TTL 的过期策略
struct PerEntryTtl;

impl Expiry<String, TtlEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &TtlEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// 本地内存缓存（Moka）
///
/// 容量上限之上的逐出由 Moka 负责（TinyLFU）
#[derive(Clone)]
pub struct MokaStore {
    cache: MokaCache<String, TtlEntry>,
}

impl MokaStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }

    /// 当前条目数（近似值，逐出是异步的）
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl LocalStore for MokaStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.cache.get(key).await.map(|entry| entry.value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let entry = TtlEntry {
            value: value.to_string(),
            ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
    }

    async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    async fn contains_key(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MokaStore::new(100);

        store.set("k1", "v1", Duration::from_secs(60)).await;
        assert_eq!(store.get("k1").await, Some("v1".to_string()));
        assert!(store.contains_key("k1").await);

        store.remove("k1").await;
        assert_eq!(store.get("k1").await, None);

        // 重复删除为 no-op
        store.remove("k1").await;
        assert_eq!(store.get("k1").await, None);
    }

    #[tokio::test]
    async fn test_per_entry_ttl_expiry() {
        let store = MokaStore::new(100);

        store.set("short", "v", Duration::from_millis(50)).await;
        store.set("long", "v", Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(120)).await;

        // 短 TTL 条目过期，长 TTL 条目仍在
        assert_eq!(store.get("short").await, None);
        assert_eq!(store.get("long").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = MokaStore::new(100);

        store.set("k", "old", Duration::from_secs(60)).await;
        store.set("k", "new", Duration::from_secs(60)).await;

        assert_eq!(store.get("k").await, Some("new".to_string()));
    }
}
