use async_trait::async_trait;

use crate::ReconResult;

/// 共享键值存储上用于互斥的原子操作
///
/// 存储错误原样返回给调用方，不做隐式重试。
#[async_trait]
pub trait LockStore: Send + Sync {
    /// 键不存在时写入并设置过期时间，返回是否写入成功
    async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: u64) -> ReconResult<bool>;

    async fn get(&self, key: &str) -> ReconResult<Option<String>>;

    async fn delete(&self, key: &str) -> ReconResult<bool>;

    /// 仅当当前值等于 `expected` 时删除（原子比较删除）
    async fn delete_if_equals(&self, key: &str, expected: &str) -> ReconResult<bool>;
}
