use async_trait::async_trait;
use recon_core::{traits::LockStore, ReconResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// 进程内锁存储，只适用于单实例部署和测试
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a Entry> {
        if entries
            .get(key)
            .is_some_and(|e| e.expires_at <= Instant::now())
        {
            entries.remove(key);
        }
        entries.get(key)
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: u64) -> ReconResult<bool> {
        let mut entries = self.entries.lock().await;
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_millis(ttl_ms),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> ReconResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> ReconResult<bool> {
        let mut entries = self.entries.lock().await;
        let existed = Self::live(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> ReconResult<bool> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            Some(entry) if entry.value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_is_exclusive() {
        let store = InMemoryLockStore::new();
        assert!(store.set_if_absent("k", "a", 10_000).await.unwrap());
        assert!(!store.set_if_absent("k", "b", 10_000).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = InMemoryLockStore::new();
        assert!(store.set_if_absent("k", "a", 100).await.unwrap());
        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.set_if_absent("k", "b", 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = InMemoryLockStore::new();
        store.set_if_absent("k", "owner-1", 10_000).await.unwrap();
        assert!(!store.delete_if_equals("k", "owner-2").await.unwrap());
        assert!(store.get("k").await.unwrap().is_some());
        assert!(store.delete_if_equals("k", "owner-1").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }
}
