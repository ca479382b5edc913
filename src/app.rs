use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use uploader_config::AppConfig;
use uploader_dispatcher::UploadDispatcher;
use uploader_domain::{ProgressSink, TaskRecordRepository};
use uploader_infrastructure::{
    DatabaseManager, HttpUploadClient, LocalFileMaterializer, SqliteTaskRecordRepository,
};
use uploader_worker::UploadTaskExecutor;

/// 组装好的应用实例
pub struct Application {
    database: DatabaseManager,
    repository: Arc<SqliteTaskRecordRepository>,
    dispatcher: Arc<UploadDispatcher>,
}

impl Application {
    pub async fn new(config: &AppConfig, progress: Arc<dyn ProgressSink>) -> Result<Self> {
        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("数据库迁移失败")?;

        let repository = Arc::new(SqliteTaskRecordRepository::new(database.pool().clone()));
        let remote = HttpUploadClient::new(&config.remote).context("创建上传客户端失败")?;
        let materializer = LocalFileMaterializer::new(&config.executor.cache_dir);

        let executor = UploadTaskExecutor::new(
            repository.clone(),
            Arc::new(materializer),
            Arc::new(remote),
        )
        .with_progress_sink(progress)
        .with_config(&config.executor);

        let dispatcher = Arc::new(UploadDispatcher::new(
            Arc::new(executor),
            repository.clone(),
            config.retry.clone(),
        ));

        info!(
            "应用已初始化: database={}, remote={}",
            config.database.url, config.remote.base_url
        );

        Ok(Self {
            database,
            repository,
            dispatcher,
        })
    }

    pub fn repository(&self) -> Arc<dyn TaskRecordRepository> {
        self.repository.clone()
    }

    pub fn dispatcher(&self) -> &Arc<UploadDispatcher> {
        &self.dispatcher
    }

    pub async fn shutdown(self) {
        self.database.close().await;
        info!("应用已关闭");
    }
}
