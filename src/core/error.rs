//! 错误类型
//!
//! - `BackendError`：引擎边界上的失败（通道断开 / 响应无法解析 / 初始化失败）
//! - `DispatchError`：调用方在同步返回值或异步回调中看到的失败
//!
//! 与 RecoveryEngine 配合：可恢复的情况（会话过期、响应损坏）在调度线程内部消化，不会到达调用方。

use thiserror::Error;

use crate::protocol::CommandKind;

/// 引擎后端错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// 传输通道失败（进程外引擎不可达等），不重试
    #[error("Engine backend unavailable: {0}")]
    Unavailable(String),

    /// 响应无法解码，按空响应处理
    #[error("Malformed engine response: {0}")]
    Malformed(String),

    #[error("Engine initialization failed: {0}")]
    Initialization(String),
}

/// 调度错误（致命错误经由正常响应的同一通道交给调用方）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// 会话过期后重建仍失败
    #[error("Session could not be re-established for {0:?}")]
    SessionLost(CommandKind),

    /// 在派发前被 remove_pending_work 丢弃
    #[error("Request cancelled before dispatch")]
    Cancelled,

    /// 调度器已关闭
    #[error("Dispatcher terminated")]
    Terminated,

    /// 引擎初始化失败，调度器无法启动
    #[error("Engine startup failed: {0}")]
    Startup(BackendError),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),
}

impl DispatchError {
    /// 致命错误：调用方无法通过重试同一命令恢复
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::Backend(_)
                | DispatchError::SessionLost(_)
                | DispatchError::Startup(_)
                | DispatchError::Spawn(_)
        )
    }
}
