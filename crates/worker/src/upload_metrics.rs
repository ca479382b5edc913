//! 上传执行指标
//!
//! 没有安装全局 recorder 时这些计数器是空操作。

use metrics::{counter, Counter};

pub struct UploadMetrics {
    materialize_failures_total: Counter,
    cleanup_failures_total: Counter,
}

impl UploadMetrics {
    pub fn new() -> Self {
        Self {
            materialize_failures_total: counter!("upload_materialize_failures_total"),
            cleanup_failures_total: counter!("upload_cleanup_failures_total"),
        }
    }

    /// 每次尝试结束时按结果计数
    pub fn record_attempt(&self, outcome: &'static str) {
        counter!("upload_attempts_total", "outcome" => outcome).increment(1);
    }

    pub fn record_materialize_failure(&self) {
        self.materialize_failures_total.increment(1);
    }

    pub fn record_cleanup_failure(&self) {
        self.cleanup_failures_total.increment(1);
    }
}

impl Default for UploadMetrics {
    fn default() -> Self {
        Self::new()
    }
}
