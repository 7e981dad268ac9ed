//! 连续输入时跳过 suggestion 计算
//!
//! 派发普通字符 / 退格按键前，若队列前 `depth` 个元素中已有另一条按键请求，
//! 本次结果马上会被覆盖，于是给请求加上 `request_suggestion = false`，让引擎省掉较重的计算。
//! 只影响吞吐，最后一条按键总会带着完整 suggestion 求值。

use super::envelope::Envelope;
use crate::protocol::{CommandKind, Input};

/// 前瞻策略，`depth == 0` 时关闭
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestionLookahead {
    depth: usize,
}

impl SuggestionLookahead {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    pub(crate) fn should_skip<'a>(
        &self,
        current: &Input,
        queued: impl IntoIterator<Item = &'a Envelope>,
    ) -> bool {
        if self.depth == 0 || !current.is_plain_typing() {
            return false;
        }
        queued
            .into_iter()
            .take(self.depth)
            .filter_map(Envelope::input)
            .any(|next| next.kind == CommandKind::SendKey)
    }
}

impl Default for SuggestionLookahead {
    fn default() -> Self {
        Self::new(1)
    }
}
