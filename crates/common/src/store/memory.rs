//! 进程内存后端
//!
//! 过期基于 `tokio::time::Instant`，测试中可以用 `tokio::time::pause` 推进。
//! 过期条目在读取时惰性剔除，并在写入达到一定次数后整体清扫一次。

use super::backend::EphemeralBackend;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

const SWEEP_EVERY_WRITES: u64 = 1024;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: String, ttl_secs: u64) -> Self {
        Self {
            value,
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// 内存后端，克隆后共享同一份数据
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    writes: Arc<AtomicU64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn note_write(&self, map: &mut HashMap<String, Entry>) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY_WRITES == 0 {
            let now = Instant::now();
            let before = map.len();
            map.retain(|_, entry| entry.is_live(now));
            debug!(removed = before - map.len(), "swept expired ephemeral entries");
        }
    }
}

#[async_trait]
impl EphemeralBackend for MemoryBackend {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut map = self.entries.write().await;
        map.insert(key.to_string(), Entry::new(value.to_string(), ttl_secs));
        self.note_write(&mut map);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut map = self.entries.write().await;
        let now = Instant::now();
        if map.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        map.insert(key.to_string(), Entry::new(value.to_string(), ttl_secs));
        self.note_write(&mut map);
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let map = self.entries.read().await;
        let now = Instant::now();
        Ok(map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut map = self.entries.write().await;
        let now = Instant::now();
        Ok(map
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn incr_expire_if_new(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let mut map = self.entries.write().await;
        let now = Instant::now();

        let next = match map.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                let current: u64 = entry.value.parse().map_err(|_| StoreError::Corrupt {
                    key: key.to_string(),
                    reason: format!("not an integer: {}", entry.value),
                })?;
                let next = current + 1;
                entry.value = next.to_string();
                next
            }
            _ => {
                map.insert(key.to_string(), Entry::new("1".to_string(), ttl_secs));
                1
            }
        };

        self.note_write(&mut map);
        Ok(next)
    }

    async fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let map = self.entries.read().await;
        let now = Instant::now();
        Ok(map
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .count() as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_ex_expires() {
        let store = MemoryBackend::new();
        store.set_ex("challenge:a", "n1", 300).await.unwrap();
        assert_eq!(store.get("challenge:a").await.unwrap().as_deref(), Some("n1"));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(store.get("challenge:a").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get("challenge:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = MemoryBackend::new();
        store.set_ex("challenge:a", "n1", 300).await.unwrap();
        assert_eq!(store.take("challenge:a").await.unwrap().as_deref(), Some("n1"));
        assert!(store.take("challenge:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_take_yields_one_winner() {
        let store = MemoryBackend::new();
        store.set_ex("challenge:a", "n1", 300).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.take("challenge:a").await.unwrap() }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_sets_ttl_only_when_new() {
        let store = MemoryBackend::new();
        assert_eq!(store.incr_expire_if_new("quota:k", 10).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        // 第二次自增不得延长过期时间
        assert_eq!(store.incr_expire_if_new("quota:k", 10).await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.get("quota:k").await.unwrap().is_none());
        assert_eq!(store.incr_expire_if_new("quota:k", 10).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let store = MemoryBackend::new();
        store.set_ex("quota:k", "abc", 10).await.unwrap();
        let err = store.incr_expire_if_new("quota:k", 10).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_set_nx_and_count_prefix() {
        let store = MemoryBackend::new();
        assert!(store.set_nx_ex("admin-nonce:x", "1", 60).await.unwrap());
        assert!(!store.set_nx_ex("admin-nonce:x", "2", 60).await.unwrap());
        assert!(store.set_nx_ex("admin-nonce:y", "1", 60).await.unwrap());
        store.set_ex("other", "1", 60).await.unwrap();
        assert_eq!(store.count_prefix("admin-nonce:").await.unwrap(), 2);
    }
}
