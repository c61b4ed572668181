use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    cache_auth::{AuthConfig, CacheConfig},
    database::DatabaseConfig,
    dispatcher_worker::{DispatcherConfig, WorkerConfig},
};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/recon.toml",
    "recon.toml",
    "/etc/recon/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub dispatcher: DispatcherConfig,
    pub auth: AuthConfig,
    pub worker: WorkerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (`RECON_<SECTION>__<KEY>`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|p| Path::new(p).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("RECON")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("auth.api_keys")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.cache.validate().context("缓存配置验证失败")?;
        self.dispatcher
            .validate()
            .context("Dispatcher配置验证失败")?;
        self.auth.validate().context("认证配置验证失败")?;
        if self.worker.enabled {
            self.worker.validate().context("Worker配置验证失败")?;
        }
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockBackend;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatcher.heartbeat_timeout_seconds, 10);
        assert_eq!(config.dispatcher.max_retries, 3);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [cache]
            lock_backend = "memory"

            [dispatcher]
            job_timeout_seconds = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.lock_backend, LockBackend::Memory);
        assert_eq!(config.dispatcher.job_timeout_seconds, 120);
        assert_eq!(config.dispatcher.heartbeat_timeout_seconds, 10);
        assert_eq!(config.api.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_job_timeout_must_exceed_heartbeat_timeout() {
        let result = AppConfig::from_toml(
            r#"
            [dispatcher]
            job_timeout_seconds = 5
            heartbeat_timeout_seconds = 10
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_offline_cleanup_threshold_must_exceed_heartbeat_timeout() {
        let result = AppConfig::from_toml(
            r#"
            [dispatcher]
            heartbeat_timeout_seconds = 30
            offline_cleanup_threshold_seconds = 20
            "#,
        );
        assert!(result.is_err());

        let disabled = AppConfig::from_toml(
            r#"
            [dispatcher]
            heartbeat_timeout_seconds = 30
            auto_cleanup_offline_workers = false
            offline_cleanup_threshold_seconds = 20
            "#,
        )
        .unwrap();
        assert!(!disabled.dispatcher.auto_cleanup_offline_workers);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [auth]
            api_keys = ["key-one"]

            [observability]
            log_format = "json"
            "#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.auth.api_keys, vec!["key-one".to_string()]);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load(Some("/nonexistent/recon.toml")).is_err());
    }

    #[test]
    fn test_toml_roundtrip_keeps_sections() {
        let text = AppConfig::default().to_toml().unwrap();
        assert!(text.contains("[dispatcher]"));
        assert!(text.contains("[worker]"));
    }
}
