//! 错误恢复引擎
//!
//! 根据一次引擎调用的结果返回 RecoveryAction，供调度线程决定是交付、重建会话后重试、
//! 按空响应处理还是上报致命错误。

use crate::core::BackendError;
use crate::protocol::Output;

/// 恢复引擎给出的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 正常交付
    Deliver,
    /// 会话过期：重建会话并重试一次
    RecreateSession,
    /// 响应损坏：记录后按空响应交付，避免流水线卡住
    TreatAsEmpty,
    /// 上报给当前命令的调用方
    Escalate,
}

/// 把引擎调用结果映射为恢复动作
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    /// 是否允许自动重建会话
    recover_session: bool,
    /// 每条命令最多重建次数
    max_session_retries: u8,
}

impl RecoveryEngine {
    pub fn new(recover_session: bool) -> Self {
        Self {
            recover_session,
            max_session_retries: 1,
        }
    }

    /// `attempt` 为该命令已经做过的会话重建次数
    pub fn handle(
        &self,
        requires_session: bool,
        outcome: &Result<Output, BackendError>,
        attempt: u8,
    ) -> RecoveryAction {
        match outcome {
            Ok(output) if output.is_session_failure() && requires_session => {
                if self.recover_session && attempt < self.max_session_retries {
                    RecoveryAction::RecreateSession
                } else {
                    RecoveryAction::Escalate
                }
            }
            Ok(_) => RecoveryAction::Deliver,
            Err(BackendError::Malformed(_)) => RecoveryAction::TreatAsEmpty,
            Err(BackendError::Unavailable(_)) | Err(BackendError::Initialization(_)) => {
                RecoveryAction::Escalate
            }
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(true)
    }
}
