use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use uploader_config::ExecutorConfig;
use uploader_domain::{
    FailureClass, MaterializedFile, NoopProgressSink, ProgressSink, ProgressUpdate, RemoteError,
    RemoteUploadService, ResourceMaterializer, TaskRecord, TaskRecordRepository, UploadInput,
    UploadOutcome, UploadResponse,
};

use crate::upload_metrics::UploadMetrics;

const MSG_INVALID_USER: &str = "Invalid userId";
const MSG_NO_PHOTOS: &str = "No photos to upload";
const MSG_NOTHING_MATERIALIZED: &str = "Failed to convert resources to files";

/// 上传任务执行器
///
/// 每次调用 `execute` 只运行一次尝试，结果以 `UploadOutcome` 返回给调度方，
/// 执行器自身从不安排重试。
///
/// 前置条件：同一个任务 id 的尝试由调度方串行调用，执行器不做按 id 的加锁。
pub struct UploadTaskExecutor {
    repository: Arc<dyn TaskRecordRepository>,
    materializer: Arc<dyn ResourceMaterializer>,
    remote: Arc<dyn RemoteUploadService>,
    progress: Arc<dyn ProgressSink>,
    in_flight_progress: u8,
    metrics: UploadMetrics,
}

impl UploadTaskExecutor {
    pub fn new(
        repository: Arc<dyn TaskRecordRepository>,
        materializer: Arc<dyn ResourceMaterializer>,
        remote: Arc<dyn RemoteUploadService>,
    ) -> Self {
        Self {
            repository,
            materializer,
            remote,
            progress: Arc::new(NoopProgressSink),
            in_flight_progress: ExecutorConfig::default().in_flight_progress,
            metrics: UploadMetrics::new(),
        }
    }

    pub fn with_progress_sink(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_config(mut self, config: &ExecutorConfig) -> Self {
        self.in_flight_progress = config.in_flight_progress.clamp(1, 99);
        self
    }

    /// 执行一次尝试
    ///
    /// 所有错误都在这里被转换成记录状态和返回值，不会向外传播。
    #[instrument(skip(self, input), fields(task_id = %task_id, attempt = attempt))]
    pub async fn execute(&self, task_id: &str, input: &UploadInput, attempt: u32) -> UploadOutcome {
        let outcome = self.run_stages(task_id, input, attempt).await;
        self.metrics.record_attempt(outcome.label());
        info!("上传尝试结束: task_id={}, outcome={}", task_id, outcome.label());
        outcome
    }

    async fn run_stages(&self, task_id: &str, input: &UploadInput, attempt: u32) -> UploadOutcome {
        if let Some(outcome) = self.simulation_gate(task_id, input, attempt).await {
            return outcome;
        }

        if let Err(reason) = validate_input(input) {
            return self.finish_failure(task_id, input, 0, reason).await;
        }

        self.start(task_id, input).await;

        let files = self.materialize_all(input).await;
        if files.is_empty() {
            return self
                .finish_failure(task_id, input, 0, MSG_NOTHING_MATERIALIZED)
                .await;
        }

        self.report_in_flight(task_id, input).await;
        let result = self
            .remote
            .upload(
                input.user_id,
                &files,
                non_blank(&input.title),
                non_blank(&input.content),
            )
            .await;

        let outcome = classify(result);
        self.persist(task_id, input, &outcome).await;
        self.cleanup(files);
        outcome
    }

    /// 尝试序号小于 fail_until_attempt 时直接要求重试，不做任何IO
    async fn simulation_gate(
        &self,
        task_id: &str,
        input: &UploadInput,
        attempt: u32,
    ) -> Option<UploadOutcome> {
        if attempt >= input.fail_until_attempt {
            return None;
        }

        let reason = format!("Simulated failure (attempt={})", attempt + 1);
        debug!("模拟失败: task_id={}, {}", task_id, reason);
        self.notify(
            task_id,
            input,
            0,
            format!("retrying... attempt={}", attempt + 1),
        );
        self.write_record(TaskRecord::retrying(task_id, input, 0, reason.as_str()))
            .await;
        Some(UploadOutcome::Retry { reason })
    }

    async fn start(&self, task_id: &str, input: &UploadInput) {
        self.write_record(TaskRecord::running(task_id, input, 0)).await;
        self.notify(task_id, input, 0, "starting...");
    }

    /// 逐个物化，失败的资源被丢弃，不影响其余资源
    async fn materialize_all(&self, input: &UploadInput) -> Vec<MaterializedFile> {
        let mut files = Vec::with_capacity(input.resource_locators.len());
        for locator in &input.resource_locators {
            match self.materializer.materialize(locator).await {
                Some(file) => files.push(file),
                None => {
                    self.metrics.record_materialize_failure();
                    warn!("资源无法转换为文件，已跳过: {}", locator);
                }
            }
        }
        debug!(
            "物化完成: {}/{} 个资源",
            files.len(),
            input.resource_locators.len()
        );
        files
    }

    async fn report_in_flight(&self, task_id: &str, input: &UploadInput) {
        let progress = self.in_flight_progress;
        self.write_record(TaskRecord::running(task_id, input, progress))
            .await;
        self.notify(task_id, input, progress, "uploading...");
    }

    async fn persist(&self, task_id: &str, input: &UploadInput, outcome: &UploadOutcome) {
        let progress = self.in_flight_progress;
        let (record, progress, message) = match outcome {
            UploadOutcome::Success { payload } => (
                TaskRecord::succeeded(task_id, input, payload.as_str()),
                100,
                "done".to_string(),
            ),
            UploadOutcome::Retry { reason } => (
                TaskRecord::retrying(task_id, input, progress, reason.as_str()),
                progress,
                reason.clone(),
            ),
            UploadOutcome::Failure { reason } => (
                TaskRecord::failed(task_id, input, progress, reason.as_str()),
                progress,
                reason.clone(),
            ),
        };
        self.write_record(record).await;
        self.notify(task_id, input, progress, message);
    }

    async fn finish_failure(
        &self,
        task_id: &str,
        input: &UploadInput,
        progress: u8,
        reason: &str,
    ) -> UploadOutcome {
        warn!("上传失败: task_id={}, reason={}", task_id, reason);
        self.write_record(TaskRecord::failed(task_id, input, progress, reason))
            .await;
        self.notify(task_id, input, progress, reason);
        UploadOutcome::Failure {
            reason: reason.to_string(),
        }
    }

    /// 删除失败只记录日志，不改变已经得出的结果
    fn cleanup(&self, files: Vec<MaterializedFile>) {
        for file in files {
            let path = file.path().to_path_buf();
            if let Err(e) = file.delete() {
                self.metrics.record_cleanup_failure();
                warn!("删除临时文件失败: {}: {}", path.display(), e);
            }
        }
    }

    async fn write_record(&self, record: TaskRecord) {
        if let Err(e) = self.repository.upsert(&record).await {
            error!(
                "写入任务记录失败: task_id={}, status={}, error={}",
                record.id, record.status, e
            );
        }
    }

    fn notify(&self, task_id: &str, input: &UploadInput, progress: u8, message: impl Into<String>) {
        self.progress.publish(ProgressUpdate {
            task_id: task_id.to_string(),
            title: input.title_or_default().to_string(),
            progress,
            message: message.into(),
        });
    }
}

/// 结构性错误，任何重试都无法修复
pub(crate) fn validate_input(input: &UploadInput) -> Result<(), &'static str> {
    if input.user_id <= 0 {
        return Err(MSG_INVALID_USER);
    }
    if input.resource_locators.is_empty() {
        return Err(MSG_NO_PHOTOS);
    }
    Ok(())
}

/// 5xx 与网络错误重试，其余一律视为永久失败
pub(crate) fn classify(result: Result<UploadResponse, RemoteError>) -> UploadOutcome {
    match result {
        Ok(response) => match response.items_json() {
            Ok(payload) => UploadOutcome::Success { payload },
            Err(e) => UploadOutcome::Failure {
                reason: e.to_string(),
            },
        },
        Err(err) => {
            let reason = err.record_message();
            match err.classify() {
                FailureClass::Transient => UploadOutcome::Retry { reason },
                FailureClass::Permanent => UploadOutcome::Failure { reason },
            }
        }
    }
}

fn non_blank(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
