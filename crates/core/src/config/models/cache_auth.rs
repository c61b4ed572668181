use serde::{Deserialize, Serialize};

/// 锁存储后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// 共享Redis，多实例部署时必须使用
    Redis,
    /// 进程内存，仅适用于单实例或测试
    Memory,
}

/// 共享缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub redis_url: String,
    pub lock_backend: LockBackend,
    pub connection_timeout_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            lock_backend: LockBackend::Redis,
            connection_timeout_seconds: 5,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lock_backend == LockBackend::Redis {
            if self.redis_url.is_empty() {
                return Err(anyhow::anyhow!("Redis URL不能为空"));
            }
            if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://")
            {
                return Err(anyhow::anyhow!("Redis URL格式无效: {}", self.redis_url));
            }
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("缓存连接超时时间必须大于0"));
        }

        Ok(())
    }
}

/// Worker认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 允许用于Join的长期API Key
    pub api_keys: Vec<String>,
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            jwt_secret: "change-this-secret-in-production".to_string(),
            token_ttl_seconds: 3600,
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.len() < 16 {
            return Err(anyhow::anyhow!("JWT密钥长度不能少于16个字符"));
        }

        if self.token_ttl_seconds <= 0 {
            return Err(anyhow::anyhow!("Token有效期必须大于0"));
        }

        if self.api_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(anyhow::anyhow!("API Key不能为空字符串"));
        }

        Ok(())
    }
}
