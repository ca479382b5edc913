//! Test data builders for creating test entities
//!
//! Builders start from sensible defaults so a test only spells out the
//! fields it cares about.

use chrono::{DateTime, Utc};
use uploader_domain::{TaskRecord, TaskStatus, UploadInput};

/// Builder for creating test UploadInput values
pub struct UploadInputBuilder {
    input: UploadInput,
    locators: Vec<String>,
}

impl UploadInputBuilder {
    pub fn new() -> Self {
        Self {
            input: UploadInput::new(42, "Trip", "Photos from the weekend"),
            locators: vec!["content://media/1".to_string()],
        }
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.input.user_id = user_id;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.input.title = title.to_string();
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.input.content = content.to_string();
        self
    }

    pub fn with_locators(mut self, locators: &[&str]) -> Self {
        self.locators = locators.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn without_locators(mut self) -> Self {
        self.locators.clear();
        self
    }

    pub fn with_fail_until_attempt(mut self, attempt: u32) -> Self {
        self.input.fail_until_attempt = attempt;
        self
    }

    pub fn build(self) -> UploadInput {
        self.input.with_locators(self.locators)
    }
}

impl Default for UploadInputBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test TaskRecord entities
pub struct TaskRecordBuilder {
    record: TaskRecord,
}

impl TaskRecordBuilder {
    pub fn new() -> Self {
        Self {
            record: TaskRecord::running("task-1", &UploadInputBuilder::new().build(), 0),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.record.id = id.to_string();
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.record.title = title.to_string();
        self
    }

    pub fn with_photo_count(mut self, photo_count: u32) -> Self {
        self.record.photo_count = photo_count;
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.record.progress = progress;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.record.created_at = created_at;
        self
    }

    pub fn running(mut self) -> Self {
        self.record.status = TaskStatus::Running;
        self.record.error_message = None;
        self.record.result_payload = None;
        self
    }

    pub fn retrying(mut self, reason: &str) -> Self {
        self.record.status = TaskStatus::Retry;
        self.record.error_message = Some(reason.to_string());
        self.record.result_payload = None;
        self
    }

    pub fn failed(mut self, reason: &str) -> Self {
        self.record.status = TaskStatus::Failed;
        self.record.error_message = Some(reason.to_string());
        self.record.result_payload = None;
        self
    }

    pub fn succeeded(mut self, payload: &str) -> Self {
        self.record.status = TaskStatus::Succeeded;
        self.record.progress = 100;
        self.record.error_message = None;
        self.record.result_payload = Some(payload.to_string());
        self
    }

    /// Bypass the consistency rules, for testing validation
    pub fn with_error_message(mut self, message: Option<&str>) -> Self {
        self.record.error_message = message.map(str::to_string);
        self
    }

    pub fn build(self) -> TaskRecord {
        self.record
    }
}

impl Default for TaskRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}
