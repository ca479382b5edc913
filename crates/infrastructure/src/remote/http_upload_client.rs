use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};
use uploader_config::RemoteConfig;
use uploader_domain::{MaterializedFile, RemoteUploadService, UploadResponse};
use uploader_errors::{RemoteError, UploadError, UploadResult};

const UPLOAD_PATH: &str = "/api/images/upload";

/// 基于 reqwest 的图片上传客户端
///
/// `POST {base_url}/api/images/upload?userId=..`，文件以 `files` 字段的
/// multipart part 发送。
pub struct HttpUploadClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUploadClient {
    pub fn new(config: &RemoteConfig) -> UploadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| UploadError::Network(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn upload_url(&self) -> String {
        format!("{}{}", self.base_url, UPLOAD_PATH)
    }

    async fn build_form(
        files: &[MaterializedFile],
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<Form, RemoteError> {
        let mut form = Form::new();
        for file in files {
            // 请求体读取失败与传输中断同类，按网络错误重试
            let bytes = tokio::fs::read(file.path())
                .await
                .map_err(|e| RemoteError::Connectivity(format!("读取上传文件失败: {e}")))?;
            let part = Part::bytes(bytes)
                .file_name(file.file_name())
                .mime_str(mime_for(file.path()))
                .map_err(|e| RemoteError::Other(e.to_string()))?;
            form = form.part("files", part);
        }
        if let Some(title) = title {
            form = form.text("title", title.to_string());
        }
        if let Some(content) = content {
            form = form.text("content", content.to_string());
        }
        Ok(form)
    }
}

#[async_trait]
impl RemoteUploadService for HttpUploadClient {
    async fn upload(
        &self,
        user_id: i64,
        files: &[MaterializedFile],
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<UploadResponse, RemoteError> {
        let form = Self::build_form(files, title, content).await?;
        debug!("上传 {} 个文件到 {}", files.len(), self.upload_url());

        let response = self
            .client
            .post(self.upload_url())
            .query(&[("userId", user_id)])
            .multipart(form)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.ok().filter(|body| !body.is_empty());
            warn!("上传被服务端拒绝: HTTP {}", status.as_u16());
            return Err(RemoteError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<UploadResponse>()
            .await
            .map_err(classify_reqwest_error)
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> RemoteError {
    if let Some(status) = err.status() {
        return RemoteError::Http {
            status: status.as_u16(),
            message: Some(err.to_string()),
        };
    }
    if err.is_decode() {
        return RemoteError::Other(format!("解析上传响应失败: {err}"));
    }
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        return RemoteError::Connectivity(err.to_string());
    }
    RemoteError::Other(err.to_string())
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}
