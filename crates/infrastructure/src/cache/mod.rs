pub mod memory_lock_store;
pub mod redis_lock_store;

pub use memory_lock_store::InMemoryLockStore;
pub use redis_lock_store::RedisLockStore;
