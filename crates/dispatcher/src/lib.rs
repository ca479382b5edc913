//! 参考调度方
//!
//! 负责分配任务 id、按退避策略重复调用执行器、保证同一任务的尝试串行，
//! 并在重试次数耗尽时写入最终失败状态。

pub mod retry_policy;
pub mod upload_dispatcher;

pub use retry_policy::RetryPolicy;
pub use upload_dispatcher::{SubmittedUpload, UploadDispatcher};
