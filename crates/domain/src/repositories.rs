//! 领域仓储抽象
//!
//! 定义任务记录存储的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;

use crate::entities::TaskRecord;
use crate::observation::RecordSubscription;
use uploader_errors::UploadResult;

/// 任务记录仓储抽象
///
/// 同一个任务 id 的写入由调度方保证串行；不同 id 可以并发写入，
/// 实现只需要保证单条记录的原子替换。
#[async_trait]
pub trait TaskRecordRepository: Send + Sync {
    /// 按 id 整体替换写入，不存在则插入
    async fn upsert(&self, record: &TaskRecord) -> UploadResult<()>;
    async fn get(&self, id: &str) -> UploadResult<Option<TaskRecord>>;
    /// 所有记录，最近写入的排在前面
    async fn list_all(&self) -> UploadResult<Vec<TaskRecord>>;
    /// 实时观察所有记录，先返回当前快照，之后每次写入推送一次
    async fn observe_all(&self) -> UploadResult<RecordSubscription>;
    /// 清空所有记录，只供外部清理使用
    async fn clear_all(&self) -> UploadResult<()>;
}
