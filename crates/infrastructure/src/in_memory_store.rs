use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uploader_domain::{RecordPublisher, RecordSubscription, TaskRecord, TaskRecordRepository};
use uploader_errors::UploadResult;

/// 内存任务记录仓储
///
/// 不跨进程持久化，用于测试和不需要持久化的嵌入场景。
#[derive(Debug, Default)]
pub struct InMemoryTaskRecordRepository {
    records: Mutex<HashMap<String, TaskRecord>>,
    publisher: RecordPublisher,
}

impl InMemoryTaskRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(records: &HashMap<String, TaskRecord>) -> Vec<TaskRecord> {
        let mut items: Vec<TaskRecord> = records.values().cloned().collect();
        items.sort_by(TaskRecord::newest_first);
        items
    }
}

#[async_trait]
impl TaskRecordRepository for InMemoryTaskRecordRepository {
    async fn upsert(&self, record: &TaskRecord) -> UploadResult<()> {
        record.validate()?;
        let mut records = self.records.lock().await;
        records.insert(record.id.clone(), record.clone());
        self.publisher.publish(Self::sorted(&records));
        debug!(
            "任务记录已写入: id={}, status={}, progress={}",
            record.id, record.status, record.progress
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> UploadResult<Option<TaskRecord>> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn list_all(&self) -> UploadResult<Vec<TaskRecord>> {
        Ok(Self::sorted(&*self.records.lock().await))
    }

    async fn observe_all(&self) -> UploadResult<RecordSubscription> {
        let records = self.records.lock().await;
        Ok(self.publisher.subscribe(Self::sorted(&records)))
    }

    async fn clear_all(&self) -> UploadResult<()> {
        let mut records = self.records.lock().await;
        records.clear();
        self.publisher.publish(Vec::new());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uploader_domain::{TaskStatus, UploadInput};

    fn input() -> UploadInput {
        UploadInput::new(1, "t", "c").with_locators(["a"])
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let repo = InMemoryTaskRecordRepository::new();
        repo.upsert(&TaskRecord::running("t1", &input(), 0))
            .await
            .unwrap();
        repo.upsert(&TaskRecord::succeeded("t1", &input(), "[]"))
            .await
            .unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_rejects_invalid_record() {
        let repo = InMemoryTaskRecordRepository::new();
        let mut record = TaskRecord::failed("t1", &input(), 0, "x");
        record.error_message = None;
        assert!(repo.upsert(&record).await.is_err());
        assert!(repo.get("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let repo = InMemoryTaskRecordRepository::new();
        let mut old = TaskRecord::running("old", &input(), 0);
        old.created_at = Utc::now() - Duration::minutes(5);
        repo.upsert(&old).await.unwrap();
        repo.upsert(&TaskRecord::running("new", &input(), 0))
            .await
            .unwrap();

        let ids: Vec<String> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_all_notifies_observers() {
        let repo = InMemoryTaskRecordRepository::new();
        repo.upsert(&TaskRecord::running("t1", &input(), 0))
            .await
            .unwrap();
        let mut subscription = repo.observe_all().await.unwrap();
        repo.clear_all().await.unwrap();

        assert_eq!(subscription.next_snapshot().await.unwrap().len(), 1);
        assert!(subscription.next_snapshot().await.unwrap().is_empty());
        assert!(repo.list_all().await.unwrap().is_empty());
    }
}
