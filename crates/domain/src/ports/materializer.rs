use std::io;
use std::path::Path;

use async_trait::async_trait;
use tempfile::NamedTempFile;

/// 把资源定位符转换成本地临时文件
#[async_trait]
pub trait ResourceMaterializer: Send + Sync {
    /// 任何IO失败都返回 None，由调用方跳过该资源继续处理
    async fn materialize(&self, locator: &str) -> Option<MaterializedFile>;
}

/// 物化后的本地文件
///
/// 文件在 `delete` 或 drop 时被删除，所以即使尝试被中途取消也不会残留。
#[derive(Debug)]
pub struct MaterializedFile {
    locator: String,
    file: NamedTempFile,
}

impl MaterializedFile {
    pub fn new(locator: impl Into<String>, file: NamedTempFile) -> Self {
        Self {
            locator: locator.into(),
            file,
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    }

    pub fn len(&self) -> u64 {
        self.file
            .as_file()
            .metadata()
            .map(|meta| meta.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 显式删除，返回删除错误供调用方记录
    pub fn delete(self) -> io::Result<()> {
        self.file.close()
    }
}
