//! 分布式锁
//!
//! 基于共享键值存储的 "set-if-absent + TTL" 原子操作实现互斥。获取失败立即返回，
//! 不阻塞也不重试；需要重试的调用方自行循环。
//!
//! 每次获取都会写入一个随机的持有者令牌，释放时做原子的比较删除，因此一个TTL已过期的
//! 持有者不会误删后继者的锁。锁不可重入：同一调用方在持有期间再次获取同一个键会失败。

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use recon_core::{traits::LockStore, ReconResult};
use tracing::{debug, warn};
use uuid::Uuid;

/// 成功获取的锁
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    pub key: String,
    pub token: String,
}

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// 尝试获取锁，键已存在时返回 `None`
    pub async fn try_acquire(&self, key: &str, ttl_ms: u64) -> ReconResult<Option<LockGuard>> {
        let token = Uuid::new_v4().to_string();
        if self.store.set_if_absent(key, &token, ttl_ms).await? {
            debug!(lock.key = key, ttl_ms, "获取锁成功");
            Ok(Some(LockGuard {
                key: key.to_string(),
                token,
            }))
        } else {
            debug!(lock.key = key, "锁已被占用");
            Ok(None)
        }
    }

    /// 释放锁，返回锁是否仍由本持有者拥有
    pub async fn release(&self, guard: &LockGuard) -> ReconResult<bool> {
        let released = self.store.delete_if_equals(&guard.key, &guard.token).await?;
        if !released {
            warn!(lock.key = %guard.key, "释放锁时发现锁已过期或被他人持有");
        }
        Ok(released)
    }

    /// 在锁内执行 `action`
    ///
    /// 锁被占用时不执行 `action` 并返回 `Ok(None)`。无论 `action` 正常返回、返回错误还是
    /// panic，锁都会被释放。存储本身的错误直接返回给调用方。
    pub async fn with_lock<T, F, Fut>(
        &self,
        key: &str,
        ttl_ms: u64,
        action: F,
    ) -> ReconResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ReconResult<T>>,
    {
        let Some(guard) = self.try_acquire(key, ttl_ms).await? else {
            return Ok(None);
        };

        let outcome = AssertUnwindSafe(action()).catch_unwind().await;
        let released = self.release(&guard).await;

        match outcome {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(result) => {
                let value = match result {
                    Ok(value) => value,
                    Err(e) => {
                        if let Err(release_error) = released {
                            warn!(lock.key = key, "释放锁失败: {}", release_error);
                        }
                        return Err(e);
                    }
                };
                released?;
                Ok(Some(value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::ReconError;
    use recon_infrastructure::InMemoryLockStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn lock() -> DistributedLock {
        DistributedLock::new(Arc::new(InMemoryLockStore::new()))
    }

    #[tokio::test]
    async fn test_try_acquire_is_exclusive() {
        let lock = lock();
        let guard = lock.try_acquire("k", 5_000).await.unwrap().unwrap();
        assert!(lock.try_acquire("k", 5_000).await.unwrap().is_none());

        assert!(lock.release(&guard).await.unwrap());
        assert!(lock.try_acquire("k", 5_000).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overlapping_with_lock_runs_one_action() {
        let lock = lock();
        let runs = Arc::new(AtomicUsize::new(0));

        let first = {
            let lock = lock.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                lock.with_lock("job", 5_000, || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, ReconError>("first")
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = lock
            .with_lock("job", 5_000, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ReconError>("second")
            })
            .await
            .unwrap();

        assert!(second.is_none());
        assert_eq!(first.await.unwrap().unwrap(), Some("first"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lock_released_after_error() {
        let lock = lock();
        let result: ReconResult<Option<()>> = lock
            .with_lock("k", 5_000, || async {
                Err(ReconError::Internal("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(lock.try_acquire("k", 5_000).await.unwrap().is_some());
    }

    async fn explode() -> ReconResult<()> {
        panic!("action panicked")
    }

    #[tokio::test]
    async fn test_lock_released_after_panic() {
        let lock = lock();
        let inner = lock.clone();
        let handle = tokio::spawn(async move { inner.with_lock("k", 5_000, explode).await });
        assert!(handle.await.is_err());
        assert!(lock.try_acquire("k", 5_000).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_not_reentrant() {
        let lock = lock();
        let nested = lock
            .with_lock("k", 5_000, || async {
                lock.with_lock("k", 5_000, || async { Ok(1) }).await
            })
            .await
            .unwrap();
        assert_eq!(nested, Some(None));
    }

    #[tokio::test]
    async fn test_expired_holder_does_not_release_successor() {
        let lock = lock();
        let stale = lock.try_acquire("k", 10).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let successor = lock.try_acquire("k", 5_000).await.unwrap().unwrap();
        assert!(!lock.release(&stale).await.unwrap());
        assert!(lock.try_acquire("k", 5_000).await.unwrap().is_none());
        assert!(lock.release(&successor).await.unwrap());
    }
}
