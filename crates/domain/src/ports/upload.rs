use async_trait::async_trait;

use crate::entities::UploadResponse;
use crate::ports::materializer::MaterializedFile;
use uploader_errors::RemoteError;

/// 远程上传服务
///
/// 调用被视为原子操作：要么所有文件都被接受，要么整次调用失败。
/// 超时必须以 `RemoteError::Connectivity` 返回。
#[async_trait]
pub trait RemoteUploadService: Send + Sync {
    async fn upload(
        &self,
        user_id: i64,
        files: &[MaterializedFile],
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<UploadResponse, RemoteError>;
}
