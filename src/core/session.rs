//! 会话状态：当前引擎会话 ID 与当前活动配置
//!
//! 只由调度线程持有和修改；其他线程只能通过提交命令间接影响它。
//! 活动配置跨会话销毁 / 重建保留，调度器整体重建时归零。

use crate::protocol::{Request, SessionId, INVALID_SESSION_ID};

/// 调度线程独占的会话状态
#[derive(Debug, Default)]
pub struct SessionState {
    /// 当前会话，`None` 表示无会话
    id: Option<SessionId>,
    /// 已合并并下发给引擎的活动配置
    active_request: Request,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    /// 记录新会话；哨兵值视为无会话
    pub fn activate(&mut self, id: SessionId) {
        self.id = (id != INVALID_SESSION_ID).then_some(id);
    }

    /// 使当前会话失效，返回旧 ID
    pub fn invalidate(&mut self) -> Option<SessionId> {
        self.id.take()
    }

    pub fn active_request(&self) -> &Request {
        &self.active_request
    }

    /// 合并增量配置
    pub fn merge_request(&mut self, delta: &Request) {
        self.active_request.merge_from(delta);
    }
}
