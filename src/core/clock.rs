//! 逻辑时钟与取消标记
//!
//! 提交时间戳由单调递增计数器产生，不依赖墙钟，同一刻提交的两条命令也能严格排序。
//! `CancelMark` 记录最近一次 remove_pending_work 的时间戳，调度线程与结果投递线程共享。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 提交时间戳
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Timestamp(u64);

/// 单调递增逻辑时钟
#[derive(Clone, Debug, Default)]
pub struct LogicalClock {
    counter: Arc<AtomicU64>,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取下一个时间戳（首个为 1）
    pub fn now(&self) -> Timestamp {
        Timestamp(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// 取消时间戳：早于或等于它提交的可取消工作均视为已取消
#[derive(Clone, Debug, Default)]
pub struct CancelMark {
    stamp: Arc<AtomicU64>,
}

impl CancelMark {
    pub fn new() -> Self {
        Self::default()
    }

    /// 推进取消时间戳，只增不减
    pub fn advance(&self, to: Timestamp) {
        self.stamp.fetch_max(to.0, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self, submitted_at: Timestamp) -> bool {
        submitted_at.0 <= self.stamp.load(Ordering::SeqCst)
    }
}
