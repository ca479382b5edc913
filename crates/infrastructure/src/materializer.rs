use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uploader_domain::{MaterializedFile, ResourceMaterializer};

const FILE_SCHEME: &str = "file://";
const DEFAULT_SUFFIX: &str = ".jpg";

/// 从本地文件系统物化资源
///
/// 支持 `file://` URI 和普通路径，其他 scheme 一律视为无法转换。
/// 数据被复制到缓存目录下的 `upload_*` 临时文件中。
#[derive(Debug, Clone)]
pub struct LocalFileMaterializer {
    cache_dir: PathBuf,
}

impl LocalFileMaterializer {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn resolve(locator: &str) -> Option<PathBuf> {
        let locator = locator.trim();
        if locator.is_empty() {
            return None;
        }
        if let Some(path) = locator.strip_prefix(FILE_SCHEME) {
            return Some(PathBuf::from(path));
        }
        if locator.contains("://") {
            warn!("不支持的资源定位符: {}", locator);
            return None;
        }
        Some(PathBuf::from(locator))
    }

    async fn copy_to_cache(&self, source: &Path) -> io::Result<NamedTempFile> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let suffix = source
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| DEFAULT_SUFFIX.to_string());
        let mut input = tokio::fs::File::open(source).await?;

        // 创建临时文件是阻塞调用，放到阻塞线程池执行
        let cache_dir = self.cache_dir.clone();
        let (temp, writer) = tokio::task::spawn_blocking(move || -> io::Result<_> {
            let temp = tempfile::Builder::new()
                .prefix("upload_")
                .suffix(&suffix)
                .tempfile_in(&cache_dir)?;
            let writer = temp.reopen()?;
            Ok((temp, writer))
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        let mut output = tokio::fs::File::from_std(writer);
        tokio::io::copy(&mut input, &mut output).await?;
        output.flush().await?;

        Ok(temp)
    }
}

#[async_trait]
impl ResourceMaterializer for LocalFileMaterializer {
    async fn materialize(&self, locator: &str) -> Option<MaterializedFile> {
        let source = Self::resolve(locator)?;
        match self.copy_to_cache(&source).await {
            Ok(temp) => {
                let file = MaterializedFile::new(locator, temp);
                debug!(
                    "资源已物化: {} -> {} ({} bytes)",
                    locator,
                    file.path().display(),
                    file.len()
                );
                Some(file)
            }
            Err(e) => {
                warn!("资源物化失败: {}: {}", locator, e);
                None
            }
        }
    }
}
