use std::time::Duration;

use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 基础重试间隔（毫秒）
    pub base_interval_ms: u64,
    /// 最大重试间隔（毫秒）
    pub max_interval_ms: u64,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
    /// 最多尝试次数（包含第一次）
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 1_000,
            max_interval_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 5,
        }
    }
}

impl RetryConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

impl ConfigValidator for RetryConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.base_interval_ms > self.max_interval_ms {
            return Err(crate::ConfigError::Validation(
                "retry.base_interval_ms must be less than or equal to max_interval_ms"
                    .to_string(),
            ));
        }
        ValidationUtils::validate_range(
            self.backoff_multiplier,
            1.0,
            10.0,
            "retry.backoff_multiplier",
        )?;
        ValidationUtils::validate_range(self.jitter_factor, 0.0, 1.0, "retry.jitter_factor")?;
        ValidationUtils::validate_count(self.max_attempts as usize, "retry.max_attempts", 100)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_validation() {
        assert!(RetryConfig::default().validate().is_ok());

        let config = RetryConfig {
            base_interval_ms: 10_000,
            max_interval_ms: 1_000,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RetryConfig {
            jitter_factor: 1.5,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RetryConfig {
            backoff_multiplier: 0.5,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
