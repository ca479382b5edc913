//! Test helper utilities and common testing patterns

use std::time::Duration;
use tokio::time::sleep;
use uploader_domain::{TaskRecord, TaskStatus};

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }
}

/// Assertion helpers for record histories
pub struct TestAssertions;

impl TestAssertions {
    /// Statuses a given task went through, one entry per snapshot that contained it
    pub fn status_history(snapshots: &[Vec<TaskRecord>], id: &str) -> Vec<(TaskStatus, u8)> {
        snapshots
            .iter()
            .filter_map(|snapshot| snapshot.iter().find(|record| record.id == id))
            .map(|record| (record.status, record.progress))
            .collect()
    }

    /// Assert that progress never decreases while the task stays in one attempt
    pub fn assert_progress_monotonic(history: &[(TaskStatus, u8)]) {
        for pair in history.windows(2) {
            assert!(
                pair[1].1 >= pair[0].1,
                "progress went backwards: {:?}",
                history
            );
        }
    }
}
