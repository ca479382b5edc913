use std::time::Duration;

use uploader_config::RetryConfig;

/// 指数退避重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// attempt 从 0 开始计数
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts()
    }

    /// 不含抖动的退避间隔
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let base_interval = self.config.base_interval_ms as f64;
        let max_interval = self.config.max_interval_ms as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);

        // 计算指数退避间隔
        let exponential_interval = base_interval * self.config.backoff_multiplier.powi(exponent);

        Duration::from_millis(exponential_interval.min(max_interval) as u64)
    }

    /// 第 attempt 次尝试要求重试后，下一次尝试前的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_interval = self.config.base_interval_ms as f64;
        let capped_interval = self.base_delay(attempt).as_millis() as f64;

        // 添加随机抖动以避免雷群效应
        let jitter =
            capped_interval * self.config.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        let final_interval = (capped_interval + jitter).max(base_interval);

        Duration::from_millis(final_interval as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            base_interval_ms: 100,
            max_interval_ms: 1_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 3,
        }
    }

    #[test]
    fn test_base_delay_grows_and_caps() {
        let policy = RetryPolicy::new(config());

        assert_eq!(policy.base_delay(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(800));
        assert_eq!(policy.base_delay(4), Duration::from_millis(1_000));
        assert_eq!(policy.base_delay(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::new(config());

        for _ in 0..100 {
            let delay = policy.delay_for(2).as_millis();
            assert!((360..=440).contains(&delay), "delay {delay}");
        }
        for _ in 0..100 {
            assert!(policy.delay_for(0) >= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::new(config());

        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(1));
        assert!(!policy.can_retry(2));
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 0,
            ..config()
        });

        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.can_retry(0));
    }
}
