//! 任务记录的实时观察
//!
//! 仓储每次写入后把完整的有序快照推送给所有订阅者。订阅者先收到订阅时刻的
//! 快照，之后按写入顺序收到每一次变化，不会合并中间状态。

use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::entities::TaskRecord;

/// 订阅者注册表
#[derive(Debug, Default)]
pub struct RecordPublisher {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Vec<TaskRecord>>>>,
}

impl RecordPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者并立即投递当前快照
    ///
    /// 调用方必须在与写入相同的锁内调用，否则快照与后续变化之间可能丢失一次写入。
    pub fn subscribe(&self, initial: Vec<TaskRecord>) -> RecordSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(initial);
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.push(tx);
        RecordSubscription { rx }
    }

    /// 向所有仍然存活的订阅者推送快照，已关闭的订阅者被移除
    pub fn publish(&self, snapshot: Vec<TaskRecord>) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        debug!("推送任务记录快照: {} 条记录, {} 个订阅者", snapshot.len(), subscribers.len());
    }

    pub fn subscriber_count(&self) -> usize {
        match self.subscribers.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// 最新优先的任务记录快照流
#[derive(Debug)]
pub struct RecordSubscription {
    rx: mpsc::UnboundedReceiver<Vec<TaskRecord>>,
}

impl RecordSubscription {
    /// 等待下一份快照，仓储被释放后返回 None
    pub async fn next_snapshot(&mut self) -> Option<Vec<TaskRecord>> {
        self.rx.recv().await
    }

    /// 取出已经到达的快照，不等待
    pub fn drain(&mut self) -> Vec<Vec<TaskRecord>> {
        let mut snapshots = Vec::new();
        while let Ok(snapshot) = self.rx.try_recv() {
            snapshots.push(snapshot);
        }
        snapshots
    }
}

impl Stream for RecordSubscription {
    type Item = Vec<TaskRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
