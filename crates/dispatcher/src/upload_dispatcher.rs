use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info, instrument, warn};
use uploader_config::RetryConfig;
use uploader_domain::{TaskRecord, TaskRecordRepository, UploadInput, UploadOutcome};
use uploader_worker::UploadTaskExecutor;

use crate::retry_policy::RetryPolicy;

/// 已提交的后台上传
pub struct SubmittedUpload {
    pub task_id: String,
    pub handle: JoinHandle<UploadOutcome>,
}

/// 上传任务调度器
///
/// 执行器只负责单次尝试，退避、次数上限和同一任务的串行化都在这里完成。
pub struct UploadDispatcher {
    executor: Arc<UploadTaskExecutor>,
    repository: Arc<dyn TaskRecordRepository>,
    policy: RetryPolicy,
    task_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    running: Mutex<HashMap<String, Vec<RunningUpload>>>,
    next_run: AtomicU64,
}

/// 后台运行的登记项，run 用来区分同一任务 id 的多次 spawn
struct RunningUpload {
    run: u64,
    handle: AbortHandle,
}

impl UploadDispatcher {
    pub fn new(
        executor: Arc<UploadTaskExecutor>,
        repository: Arc<dyn TaskRecordRepository>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            executor,
            repository,
            policy: RetryPolicy::new(retry_config),
            task_locks: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            next_run: AtomicU64::new(0),
        }
    }

    pub fn new_task_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// 分配新的任务 id 并在后台运行直到得到最终结果
    pub fn submit(self: &Arc<Self>, input: UploadInput) -> SubmittedUpload {
        let task_id = Self::new_task_id();
        let handle = self.spawn(task_id.clone(), input);
        SubmittedUpload { task_id, handle }
    }

    pub fn spawn(self: &Arc<Self>, task_id: String, input: UploadInput) -> JoinHandle<UploadOutcome> {
        let dispatcher = Arc::clone(self);
        let id = task_id.clone();
        let run = self.next_run.fetch_add(1, Ordering::Relaxed);

        // 先登记再放行，避免任务结束早于登记留下过期句柄
        let mut running = lock(&self.running);
        let handle = tokio::spawn(async move {
            let outcome = dispatcher.run_to_completion(&id, &input).await;
            dispatcher.unregister(&id, run);
            outcome
        });
        running.entry(task_id).or_default().push(RunningUpload {
            run,
            handle: handle.abort_handle(),
        });
        handle
    }

    /// 取消该 id 下所有正在运行的任务，尝试中的物化文件随 future 一起被删除
    pub fn cancel(&self, task_id: &str) -> bool {
        match lock(&self.running).remove(task_id) {
            Some(runs) => {
                runs.iter().for_each(|entry| entry.handle.abort());
                info!("已取消上传任务: {} ({} 个运行)", task_id, runs.len());
                true
            }
            None => {
                warn!("任务取消失败：任务 {} 不在运行中", task_id);
                false
            }
        }
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        lock(&self.running).contains_key(task_id)
    }

    pub fn running_count(&self) -> usize {
        lock(&self.running).values().map(Vec::len).sum()
    }

    /// 依次运行尝试，直到成功、永久失败或重试次数耗尽
    #[instrument(skip(self, input), fields(task_id = %task_id))]
    pub async fn run_to_completion(&self, task_id: &str, input: &UploadInput) -> UploadOutcome {
        // 正常返回、取消和 panic 时都会释放该 id 的锁登记
        let lease = self.lease(task_id);
        let mut attempt = 0;
        loop {
            let outcome = {
                let _guard = lease.lock.lock().await;
                self.executor.execute(task_id, input, attempt).await
            };

            let reason = match &outcome {
                UploadOutcome::Retry { reason } => reason.clone(),
                _ => return outcome,
            };

            if !self.policy.can_retry(attempt) {
                return self.give_up(task_id, input, &reason).await;
            }

            let delay = self.policy.delay_for(attempt);
            info!(
                "任务 {} 第 {} 次尝试要求重试 ({})，{:?} 后重试",
                task_id,
                attempt + 1,
                reason,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn lease<'a>(&'a self, task_id: &'a str) -> TaskLockLease<'a> {
        let task_lock = {
            let mut locks = lock(&self.task_locks);
            Arc::clone(locks.entry(task_id.to_string()).or_default())
        };
        TaskLockLease {
            locks: &self.task_locks,
            task_id,
            lock: task_lock,
        }
    }

    fn unregister(&self, task_id: &str, run: u64) {
        let mut running = lock(&self.running);
        if let Some(runs) = running.get_mut(task_id) {
            runs.retain(|entry| entry.run != run);
            if runs.is_empty() {
                running.remove(task_id);
            }
        }
    }

    /// 重试次数耗尽，把最后一次的重试原因转换成最终失败
    async fn give_up(&self, task_id: &str, input: &UploadInput, reason: &str) -> UploadOutcome {
        let reason = format!("Retry limit exceeded: {reason}");
        warn!("任务 {} 重试次数耗尽: {}", task_id, reason);

        let progress = match self.repository.get(task_id).await {
            Ok(Some(record)) => record.progress,
            Ok(None) => 0,
            Err(e) => {
                error!("读取任务记录失败: task_id={}, error={}", task_id, e);
                0
            }
        };
        let record = TaskRecord::failed(task_id, input, progress, reason.as_str());
        if let Err(e) = self.repository.upsert(&record).await {
            error!("写入最终失败状态失败: task_id={}, error={}", task_id, e);
        }
        UploadOutcome::Failure { reason }
    }
}

/// 一次 `run_to_completion` 对任务锁的占用
///
/// 最后一个占用者释放时把锁从表中移除。
struct TaskLockLease<'a> {
    locks: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    task_id: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for TaskLockLease<'_> {
    fn drop(&mut self) {
        let mut locks = lock(self.locks);
        // 表里一份加上自己一份，说明没有其他占用者
        if locks
            .get(self.task_id)
            .is_some_and(|held| Arc::ptr_eq(held, &self.lock) && Arc::strong_count(held) == 2)
        {
            locks.remove(self.task_id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uploader_infrastructure::InMemoryTaskRecordRepository;
    use uploader_testing_utils::{
        MockRemoteUploadService, MockResourceMaterializer, TestEnv, UploadInputBuilder,
    };

    fn dispatcher(remote: Arc<MockRemoteUploadService>) -> Arc<UploadDispatcher> {
        let repository = Arc::new(InMemoryTaskRecordRepository::new());
        let executor = Arc::new(UploadTaskExecutor::new(
            repository.clone(),
            Arc::new(MockResourceMaterializer::new()),
            remote,
        ));
        Arc::new(UploadDispatcher::new(
            executor,
            repository,
            RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            },
        ))
    }

    async fn wait_for_calls(remote: &Arc<MockRemoteUploadService>, calls: usize) {
        let remote = remote.clone();
        let reached = TestEnv::wait_for(
            || {
                let remote = remote.clone();
                async move { remote.call_count() >= calls }
            },
            Duration::from_secs(5),
        )
        .await;
        assert!(reached);
    }

    #[tokio::test]
    async fn test_cancelled_runs_release_task_locks() {
        let remote = Arc::new(MockRemoteUploadService::new().with_delay(Duration::from_secs(30)));
        let dispatcher = dispatcher(remote.clone());

        for round in 1..=5 {
            let submitted = dispatcher.submit(UploadInputBuilder::new().build());
            wait_for_calls(&remote, round).await;
            assert_eq!(lock(&dispatcher.task_locks).len(), 1);

            assert!(dispatcher.cancel(&submitted.task_id));
            assert!(submitted.handle.await.unwrap_err().is_cancelled());
        }

        assert!(lock(&dispatcher.task_locks).is_empty());
        assert_eq!(dispatcher.running_count(), 0);
    }

    #[tokio::test]
    async fn test_finished_runs_release_task_locks() {
        let remote = Arc::new(MockRemoteUploadService::new());
        let dispatcher = dispatcher(remote);

        let outcome = dispatcher
            .run_to_completion("t1", &UploadInputBuilder::new().build())
            .await;

        assert!(outcome.is_success());
        assert!(lock(&dispatcher.task_locks).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_spawn_keeps_both_runs_cancellable() {
        let remote = Arc::new(MockRemoteUploadService::new().with_delay(Duration::from_secs(30)));
        let dispatcher = dispatcher(remote.clone());
        let input = UploadInputBuilder::new().build();

        let first = dispatcher.spawn("dup".to_string(), input.clone());
        let second = dispatcher.spawn("dup".to_string(), input);
        wait_for_calls(&remote, 1).await;
        assert_eq!(dispatcher.running_count(), 2);

        assert!(dispatcher.cancel("dup"));
        assert!(first.await.unwrap_err().is_cancelled());
        assert!(second.await.unwrap_err().is_cancelled());
        assert!(!dispatcher.is_running("dup"));
        assert!(lock(&dispatcher.task_locks).is_empty());
    }

    #[tokio::test]
    async fn test_finished_run_does_not_unregister_newer_run() {
        let remote = Arc::new(MockRemoteUploadService::new().with_delay(Duration::from_secs(30)));
        let dispatcher = dispatcher(remote.clone());

        // 第一个运行被模拟失败拦下，不调用远程服务就结束
        let quick = dispatcher.spawn(
            "dup".to_string(),
            UploadInputBuilder::new().with_fail_until_attempt(1).build(),
        );
        let slow = dispatcher.spawn("dup".to_string(), UploadInputBuilder::new().build());

        assert!(quick.await.unwrap().is_failure());
        wait_for_calls(&remote, 1).await;
        assert!(dispatcher.is_running("dup"));
        assert_eq!(dispatcher.running_count(), 1);

        assert!(dispatcher.cancel("dup"));
        assert!(slow.await.unwrap_err().is_cancelled());
        assert!(lock(&dispatcher.task_locks).is_empty());
    }
}
