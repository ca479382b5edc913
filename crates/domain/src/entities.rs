use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uploader_errors::{UploadError, UploadResult};

/// 一次上传最多携带的照片数量
pub const MAX_PHOTOS_PER_POST: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "RETRY")]
    Retry,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "RUNNING",
            TaskStatus::Retry => "RETRY",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
        }
    }

    /// SUCCEEDED 与 FAILED 之后不会再有尝试
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(TaskStatus::Running),
            "RETRY" => Ok(TaskStatus::Retry),
            "SUCCEEDED" => Ok(TaskStatus::Succeeded),
            "FAILED" => Ok(TaskStatus::Failed),
            _ => Err(UploadError::Serialization(format!(
                "Invalid upload task status: {s}"
            ))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<TaskStatus>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 上传任务的状态快照
///
/// 每个任务 id 只有一条记录，每次状态变化都整体覆盖写入。
/// `created_at` 是最近一次写入的时间，而不是任务首次创建的时间。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub photo_count: u32,
    pub status: TaskStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub result_payload: Option<String>,
}

impl TaskRecord {
    fn from_input(
        id: &str,
        input: &UploadInput,
        status: TaskStatus,
        progress: u8,
        error_message: Option<String>,
        result_payload: Option<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            title: input.title.clone(),
            content: input.content.clone(),
            photo_count: input.photo_count,
            status,
            progress: progress.min(100),
            created_at: Utc::now(),
            error_message,
            result_payload,
        }
    }

    pub fn running(id: &str, input: &UploadInput, progress: u8) -> Self {
        Self::from_input(id, input, TaskStatus::Running, progress, None, None)
    }

    pub fn retrying(id: &str, input: &UploadInput, progress: u8, reason: impl Into<String>) -> Self {
        Self::from_input(id, input, TaskStatus::Retry, progress, Some(reason.into()), None)
    }

    pub fn failed(id: &str, input: &UploadInput, progress: u8, reason: impl Into<String>) -> Self {
        Self::from_input(id, input, TaskStatus::Failed, progress, Some(reason.into()), None)
    }

    pub fn succeeded(id: &str, input: &UploadInput, payload: impl Into<String>) -> Self {
        Self::from_input(id, input, TaskStatus::Succeeded, 100, None, Some(payload.into()))
    }

    /// 检查记录内部的一致性，仓储在写入前调用
    pub fn validate(&self) -> UploadResult<()> {
        if self.id.trim().is_empty() {
            return Err(UploadError::invalid_input("task id cannot be empty"));
        }
        if self.progress > 100 {
            return Err(UploadError::invalid_input(format!(
                "progress {} out of range",
                self.progress
            )));
        }
        match self.status {
            TaskStatus::Succeeded => {
                if self.progress != 100 || self.error_message.is_some() {
                    return Err(UploadError::invalid_input(
                        "succeeded record requires progress 100 and no error message",
                    ));
                }
            }
            TaskStatus::Failed | TaskStatus::Retry => {
                if self.error_message.is_none() {
                    return Err(UploadError::invalid_input(format!(
                        "{} record requires an error message",
                        self.status
                    )));
                }
            }
            TaskStatus::Running => {}
        }
        if self.status != TaskStatus::Succeeded && self.result_payload.is_some() {
            return Err(UploadError::invalid_input(
                "result payload is only allowed on succeeded records",
            ));
        }
        Ok(())
    }

    /// 最近写入的排在前面，时间相同时按 id 排序保证结果稳定
    pub fn newest_first(a: &TaskRecord, b: &TaskRecord) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// 一次尝试的不可变输入
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UploadInput {
    pub user_id: i64,
    pub resource_locators: Vec<String>,
    pub title: String,
    pub content: String,
    pub photo_count: u32,
    /// 尝试序号小于该值时直接返回重试，用于确定性地验证重试链路
    #[serde(default)]
    pub fail_until_attempt: u32,
}

impl UploadInput {
    pub fn new(user_id: i64, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            user_id,
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// 按顺序去重并截断到 MAX_PHOTOS_PER_POST，同时更新 photo_count
    pub fn with_locators<I, S>(mut self, locators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for locator in locators {
            let locator = locator.into();
            if !unique.contains(&locator) {
                unique.push(locator);
            }
        }
        unique.truncate(MAX_PHOTOS_PER_POST);
        self.photo_count = unique.len() as u32;
        self.resource_locators = unique;
        self
    }

    pub fn with_fail_until_attempt(mut self, attempt: u32) -> Self {
        self.fail_until_attempt = attempt;
        self
    }

    pub fn title_or_default(&self) -> &str {
        if self.title.trim().is_empty() {
            "Uploading"
        } else {
            &self.title
        }
    }
}

/// 服务端返回的单个已上传文件描述
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedItem {
    pub id: i64,
    pub url: String,
    pub original_name: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: String,
    pub items: Vec<UploadedItem>,
}

impl UploadResponse {
    /// 写入 result_payload 的 JSON 数组
    pub fn items_json(&self) -> UploadResult<String> {
        Ok(serde_json::to_string(&self.items)?)
    }
}

/// 一次尝试返回给调度方的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success { payload: String },
    Retry { reason: String },
    Failure { reason: String },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, UploadOutcome::Retry { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, UploadOutcome::Failure { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            UploadOutcome::Success { .. } => "success",
            UploadOutcome::Retry { .. } => "retry",
            UploadOutcome::Failure { .. } => "failure",
        }
    }
}

/// 推送给前台通知的进度
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub task_id: String,
    pub title: String,
    pub progress: u8,
    pub message: String,
}
