use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::DatabaseConfig, executor::ExecutorConfig, observability::ObservabilityConfig,
    remote::RemoteConfig, retry::RetryConfig,
};
use crate::validation::ConfigValidator;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["config/uploader.toml", "uploader.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载顺序: 内置默认值 < 配置文件 < UPLOADER__SECTION__KEY 环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults =
            ConfigBuilder::try_from(&AppConfig::default()).context("构建默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("UPLOADER")
                .prefix_separator("__")
                .separator("__")
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

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.database.validate()?;
        self.executor.validate()?;
        self.remote.validate()?;
        self.retry.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.executor.in_flight_progress, 40);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.remote.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_app_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_serialization() {
        let config = AppConfig::default();
        let serialized = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: AppConfig =
            serde_json::from_str(&serialized).expect("Failed to deserialize");

        assert_eq!(config.retry.max_attempts, deserialized.retry.max_attempts);
        assert_eq!(config.database.url, deserialized.database.url);
    }

    #[test]
    fn test_app_config_from_toml() {
        let toml_str = r#"
[database]
url = "sqlite::memory:"
max_connections = 1
min_connections = 1
connection_timeout_seconds = 5
idle_timeout_seconds = 60

[retry]
base_interval_ms = 10
max_interval_ms = 100
backoff_multiplier = 2.0
jitter_factor = 0.0
max_attempts = 3
"#;

        let config = AppConfig::from_toml(toml_str).expect("Failed to parse TOML");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.retry.max_attempts, 3);
        // 未出现的段落使用默认值
        assert_eq!(config.executor.in_flight_progress, 40);
    }

    #[test]
    fn test_app_config_from_invalid_toml() {
        let toml_str = r#"
[executor]
cache_dir = "/tmp/uploader"
in_flight_progress = 100
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_to_toml_round_trip() {
        let config = AppConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed.remote.timeout_seconds, config.remote.timeout_seconds);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[remote]\nbase_url = \"https://images.example.com\"\ntimeout_seconds = 10"
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.remote.base_url, "https://images.example.com");
        assert_eq!(config.remote.timeout_seconds, 10);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/uploader.toml")).is_err());
    }

    #[test]
    fn test_shipped_sample_config_is_valid() {
        let config =
            AppConfig::from_toml(include_str!("../../../../config/uploader.toml")).unwrap();
        assert_eq!(config.executor.in_flight_progress, 40);
        assert_eq!(config.observability.log_format, crate::LogFormat::Pretty);
    }
}
