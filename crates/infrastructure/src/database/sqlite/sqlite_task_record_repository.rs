use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};
use uploader_domain::{RecordPublisher, RecordSubscription, TaskRecord, TaskRecordRepository};
use uploader_errors::{UploadError, UploadResult};

const SELECT_COLUMNS: &str = "SELECT id, title, content, photo_count, status, progress, \
     created_at, error_message, result_json FROM upload_tasks";

/// SQLite 任务记录仓储
///
/// 写入与快照推送在同一把锁内完成，订阅者看到的快照顺序与写入顺序一致。
pub struct SqliteTaskRecordRepository {
    pool: SqlitePool,
    publisher: RecordPublisher,
    write_lock: Mutex<()>,
}

impl SqliteTaskRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            publisher: RecordPublisher::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// 当前登记的订阅者数量，已关闭的订阅者在下一次推送时才会移除
    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> UploadResult<TaskRecord> {
        let photo_count: i64 = row.try_get("photo_count")?;
        let progress: i64 = row.try_get("progress")?;
        let created_at_micros: i64 = row.try_get("created_at")?;
        let created_at = DateTime::from_timestamp_micros(created_at_micros).ok_or_else(|| {
            UploadError::Serialization(format!("无效的时间戳: {created_at_micros}"))
        })?;

        Ok(TaskRecord {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            photo_count: u32::try_from(photo_count)
                .map_err(|e| UploadError::Serialization(format!("无效的照片数量: {e}")))?,
            status: row.try_get("status")?,
            progress: u8::try_from(progress)
                .map_err(|e| UploadError::Serialization(format!("无效的进度: {e}")))?,
            created_at,
            error_message: row.try_get("error_message")?,
            result_payload: row.try_get("result_json")?,
        })
    }

    async fn snapshot(&self) -> UploadResult<Vec<TaskRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

#[async_trait]
impl TaskRecordRepository for SqliteTaskRecordRepository {
    #[instrument(skip(self, record), fields(
        task_id = %record.id,
        status = %record.status,
        progress = record.progress,
    ))]
    async fn upsert(&self, record: &TaskRecord) -> UploadResult<()> {
        record.validate()?;

        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT INTO upload_tasks (id, title, content, photo_count, status, progress,
                                      created_at, error_message, result_json)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                photo_count = excluded.photo_count,
                status = excluded.status,
                progress = excluded.progress,
                created_at = excluded.created_at,
                error_message = excluded.error_message,
                result_json = excluded.result_json
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.content)
        .bind(i64::from(record.photo_count))
        .bind(record.status)
        .bind(i64::from(record.progress))
        .bind(record.created_at.timestamp_micros())
        .bind(&record.error_message)
        .bind(&record.result_payload)
        .execute(&self.pool)
        .await?;

        debug!("任务记录已写入: {}", record.id);

        // 写入已经提交，快照失败只影响本次推送
        if self.publisher.subscriber_count() > 0 {
            match self.snapshot().await {
                Ok(snapshot) => self.publisher.publish(snapshot),
                Err(e) => error!("读取任务记录快照失败，跳过推送: task_id={}, error={}", record.id, e),
            }
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> UploadResult<Option<TaskRecord>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> UploadResult<Vec<TaskRecord>> {
        self.snapshot().await
    }

    async fn observe_all(&self) -> UploadResult<RecordSubscription> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.snapshot().await?;
        Ok(self.publisher.subscribe(snapshot))
    }

    #[instrument(skip(self))]
    async fn clear_all(&self) -> UploadResult<()> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM upload_tasks")
            .execute(&self.pool)
            .await?;
        self.publisher.publish(Vec::new());
        debug!("已清空 {} 条任务记录", result.rows_affected());
        Ok(())
    }
}
