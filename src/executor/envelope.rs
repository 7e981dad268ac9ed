//! 请求信封与待投递回调
//!
//! 调度队列只有一个，队列元素是强类型的 `Envelope` 枚举；每个变体自带载荷，
//! 同步请求携带一次性的 oneshot 发送端（恰好一个发送方、一个等待方）。

use tokio::sync::oneshot;

use crate::core::{DispatchError, Timestamp};
use crate::protocol::{Input, Output, Request, SessionId, TriggeringKeyEvent};

/// 异步求值回调：在结果投递线程上至多调用一次
pub type Callback =
    Box<dyn FnOnce(Result<Output, DispatchError>, Option<TriggeringKeyEvent>) + Send + 'static>;

/// 把闭包装箱为回调
pub fn callback<F>(f: F) -> Option<Callback>
where
    F: FnOnce(Result<Output, DispatchError>, Option<TriggeringKeyEvent>) + Send + 'static,
{
    Some(Box::new(f))
}

/// 异步请求信封
pub(crate) struct AsyncEnvelope {
    pub submitted_at: Timestamp,
    pub input: Input,
    pub triggering_event: Option<TriggeringKeyEvent>,
    pub callback: Option<Callback>,
}

/// 同步请求信封
pub(crate) struct SyncEnvelope {
    pub submitted_at: Timestamp,
    pub input: Input,
    pub responder: oneshot::Sender<Result<Output, DispatchError>>,
}

/// 调度队列元素
pub(crate) enum Envelope {
    Async(AsyncEnvelope),
    Sync(SyncEnvelope),
    /// 合并并下发活动配置
    UpdateRequest(Request),
    /// 健康检查：失败则透明重建会话
    CheckSession(oneshot::Sender<Result<SessionId, DispatchError>>),
    DeleteSession,
    /// 屏障：调度线程处理到它时，之前的工作都已派发，之后再经结果投递线程回执
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

impl Envelope {
    /// 队列中可供前瞻的请求
    pub fn input(&self) -> Option<&Input> {
        match self {
            Envelope::Async(envelope) => Some(&envelope.input),
            Envelope::Sync(envelope) => Some(&envelope.input),
            _ => None,
        }
    }
}

/// 结果合并分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// 可被同一流上更新的结果覆盖而跳过投递
    Squashable,
    /// 总是投递
    Unsquashable,
}

impl Classification {
    /// 同时满足：无上屏结果、无删除指令、按键被消费、至少一个候选；
    /// ExpandSuggestion 的结果只做追加，永不合并
    pub fn of(input: &Input, outcome: &Result<Output, DispatchError>) -> Self {
        let Ok(output) = outcome else {
            return Classification::Unsquashable;
        };
        if input.is_expand_suggestion() {
            return Classification::Unsquashable;
        }
        if output.result.is_none()
            && output.deletion_range.is_none()
            && output.consumed
            && output.has_candidates()
        {
            Classification::Squashable
        } else {
            Classification::Unsquashable
        }
    }
}

/// 投递线程队列元素
pub(crate) enum SinkItem {
    Result(PendingCallback),
    Barrier(oneshot::Sender<()>),
}

/// 等待投递的回调
pub(crate) struct PendingCallback {
    pub submitted_at: Timestamp,
    pub classification: Classification,
    pub outcome: Result<Output, DispatchError>,
    pub triggering_event: Option<TriggeringKeyEvent>,
    pub callback: Callback,
}
