pub mod sqlite_task_record_repository;

pub use sqlite_task_record_repository::SqliteTaskRecordRepository;

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uploader_config::DatabaseConfig;
use uploader_errors::UploadResult;

const CREATE_UPLOAD_TASKS: &str = r#"
CREATE TABLE IF NOT EXISTS upload_tasks (
    id            TEXT PRIMARY KEY NOT NULL,
    title         TEXT NOT NULL,
    content       TEXT NOT NULL,
    photo_count   INTEGER NOT NULL,
    status        TEXT NOT NULL,
    progress      INTEGER NOT NULL,
    created_at    INTEGER NOT NULL,
    error_message TEXT,
    result_json   TEXT
)
"#;

const CREATE_CREATED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_upload_tasks_created_at ON upload_tasks (created_at DESC)";

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> UploadResult<Self> {
        let mut options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));

        // 内存数据库随连接关闭而消失，只能保留唯一且常驻的连接
        options = if config.is_in_memory() {
            options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                .max_lifetime(Duration::from_secs(1800)) // 30分钟默认生命周期
        };

        let pool = options.connect(&config.url).await?;
        info!("SQLite连接池已创建: {}", config.url);
        Ok(Self { pool })
    }

    /// 用于测试的内存数据库，已完成建表
    pub async fn in_memory() -> UploadResult<Self> {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        };
        let manager = Self::new(&config).await?;
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> UploadResult<()> {
        sqlx::query(CREATE_UPLOAD_TASKS).execute(&self.pool).await?;
        sqlx::query(CREATE_CREATED_AT_INDEX)
            .execute(&self.pool)
            .await?;
        debug!("upload_tasks 表已就绪");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
