use std::path::PathBuf;

use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 上传执行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// 物化文件存放目录
    pub cache_dir: PathBuf,
    /// 远程调用开始前上报的进度
    pub in_flight_progress: u8,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("uploader"),
            in_flight_progress: 40,
        }
    }
}

impl ConfigValidator for ExecutorConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(
            &self.cache_dir.to_string_lossy(),
            "executor.cache_dir",
        )?;
        if self.in_flight_progress == 0 || self.in_flight_progress >= 100 {
            return Err(crate::ConfigError::Validation(format!(
                "executor.in_flight_progress must be between 1 and 99, got {}",
                self.in_flight_progress
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_config_validation() {
        assert!(ExecutorConfig::default().validate().is_ok());

        let config = ExecutorConfig {
            in_flight_progress: 100,
            ..ExecutorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ExecutorConfig {
            in_flight_progress: 0,
            ..ExecutorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
