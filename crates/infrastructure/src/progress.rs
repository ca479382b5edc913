use tokio::sync::mpsc;
use tracing::{debug, info};
use uploader_domain::{ProgressSink, ProgressUpdate};

/// 把进度写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn publish(&self, update: ProgressUpdate) {
        info!(
            task_id = %update.task_id,
            progress = update.progress,
            "[{}] {}% {}",
            update.title,
            update.progress,
            update.message
        );
    }
}

/// 通过有界通道转发进度，通道满时丢弃
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::Sender<ProgressUpdate>,
}

impl ChannelProgressSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn publish(&self, update: ProgressUpdate) {
        if let Err(e) = self.tx.try_send(update) {
            debug!("进度通知被丢弃: {}", e);
        }
    }
}
