//! 结果投递线程
//!
//! 在调度线程之外的独立线程上按完成顺序调用回调，回调之间不会并发重入调用方代码。
//! 投递前有两道过滤：
//! - 提交时间戳不晚于取消时间戳的结果直接丢弃
//! - 新结果入队时，清除队列中尚未投递的可合并结果（UI 会立即被新结果覆盖）

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;

use super::envelope::{Classification, PendingCallback, SinkItem};
use crate::core::CancelMark;

pub(crate) struct ResultSink {
    rx: mpsc::UnboundedReceiver<SinkItem>,
    queue: VecDeque<SinkItem>,
    cancel: CancelMark,
    squash: bool,
}

impl ResultSink {
    pub fn new(rx: mpsc::UnboundedReceiver<SinkItem>, cancel: CancelMark, squash: bool) -> Self {
        Self {
            rx,
            queue: VecDeque::new(),
            cancel,
            squash,
        }
    }

    /// 线程主循环：发送端全部关闭且队列清空后退出
    pub fn run(mut self) {
        loop {
            if self.queue.is_empty() {
                match self.rx.blocking_recv() {
                    Some(item) => self.enqueue(item),
                    None => break,
                }
            }
            while let Ok(item) = self.rx.try_recv() {
                self.enqueue(item);
            }
            if let Some(item) = self.queue.pop_front() {
                self.deliver(item);
            }
        }
        tracing::debug!("Result sink stopped");
    }

    fn enqueue(&mut self, item: SinkItem) {
        if self.squash && matches!(item, SinkItem::Result(_)) {
            let before = self.queue.len();
            self.queue.retain(|queued| {
                !matches!(
                    queued,
                    SinkItem::Result(PendingCallback {
                        classification: Classification::Squashable,
                        ..
                    })
                )
            });
            let squashed = before - self.queue.len();
            if squashed > 0 {
                tracing::debug!(squashed, "Squashed stale results");
            }
        }
        self.queue.push_back(item);
    }

    fn deliver(&mut self, item: SinkItem) {
        match item {
            SinkItem::Barrier(done) => {
                let _ = done.send(());
            }
            SinkItem::Result(pending) => {
                if self.cancel.is_cancelled(pending.submitted_at) {
                    tracing::debug!("Dropping result submitted before cancellation");
                    return;
                }
                let PendingCallback {
                    outcome,
                    triggering_event,
                    callback,
                    ..
                } = pending;
                let delivered = panic::catch_unwind(AssertUnwindSafe(move || {
                    callback(outcome, triggering_event)
                }));
                if delivered.is_err() {
                    tracing::error!("Result callback panicked");
                }
            }
        }
    }
}
