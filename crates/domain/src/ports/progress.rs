use crate::entities::ProgressUpdate;

/// 前台进度通知
///
/// 实现不能阻塞调用方，投递失败直接丢弃。
pub trait ProgressSink: Send + Sync {
    fn publish(&self, update: ProgressUpdate);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn publish(&self, _update: ProgressUpdate) {}
}
