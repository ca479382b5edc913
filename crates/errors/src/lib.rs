use thiserror::Error;


#[derive(Debug, Error)]
pub enum UploadError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("远程上传失败: {0}")]
    Remote(#[from] RemoteError),
    #[error("无效的上传参数: {0}")]
    InvalidInput(String),
}

pub type UploadResult<T> = Result<T, UploadError>;

impl UploadError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        UploadError::Serialization(err.to_string())
    }
}

/// 失败类别：决定一次失败的尝试是否值得重试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 重试无法修复（参数错误、请求被拒绝、未知错误）
    Permanent,
    /// 服务端或网络问题，重试可能成功
    Transient,
}

/// 远程上传服务返回的分类错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// 服务端返回了非2xx状态码
    #[error("HTTP {status}")]
    Http { status: u16, message: Option<String> },
    /// 连接失败、超时或传输中断
    #[error("Network error")]
    Connectivity(String),
    /// 无法归类的错误
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub fn http(status: u16) -> Self {
        Self::Http {
            status,
            message: None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemoteError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 5xx 与网络错误可重试，其余状态码和未知错误都按永久失败处理
    pub fn classify(&self) -> FailureClass {
        match self {
            RemoteError::Http { status, .. } if (500..=599).contains(status) => {
                FailureClass::Transient
            }
            RemoteError::Http { .. } => FailureClass::Permanent,
            RemoteError::Connectivity(_) => FailureClass::Transient,
            RemoteError::Other(_) => FailureClass::Permanent,
        }
    }

    /// 写入任务记录的错误信息
    pub fn record_message(&self) -> String {
        match self {
            RemoteError::Other(message) if message.trim().is_empty() => "Unknown error".to_string(),
            other => other.to_string(),
        }
    }
}
