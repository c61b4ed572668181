use std::time::Duration;

use serde::{Deserialize, Serialize};

/// PostgreSQL 连接池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    /// 启动时执行 `migrations/` 下的迁移
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/recon".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let scheme_ok = ["postgresql://", "postgres://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme));
        if !scheme_ok {
            return Err(anyhow::anyhow!(
                "数据库URL必须以 postgres:// 或 postgresql:// 开头: '{}'",
                self.url
            ));
        }

        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!(
                "连接池大小无效: min={}, max={}",
                self.min_connections,
                self.max_connections
            ));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("connection_timeout_seconds 必须大于0"));
        }

        Ok(())
    }
}
