//! 串行执行器
//!
//! - **dispatcher**: 调度线程，独占引擎与会话，按提交顺序派发
//! - **envelope**: 队列元素与回调类型、结果合并分类
//! - **lookahead**: 连续输入时跳过 suggestion 计算
//! - **sink**: 结果投递线程，负责合并与取消过滤

mod dispatcher;
mod envelope;
mod lookahead;
mod sink;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use envelope::{callback, Callback, Classification};
pub use lookahead::SuggestionLookahead;
