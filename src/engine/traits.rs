//! 引擎后端抽象
//!
//! 所有后端（进程内 / 远程 / Mock）实现 EngineBackend。引擎本身没有并发控制，
//! 调度器保证同一时刻只有调度线程调用它，因此方法取 `&mut self`，不要求 `Sync`。

use std::path::PathBuf;

use crate::core::BackendError;
use crate::protocol::{Input, Output};

/// 引擎启动参数
#[derive(Debug, Clone, Default)]
pub struct StartupContext {
    /// 词典与学习数据目录
    pub data_dir: Option<PathBuf>,
    /// 客户端标识（写入引擎日志）
    pub client_name: Option<String>,
}

/// 引擎后端：一问一答的阻塞调用
pub trait EngineBackend: Send + 'static {
    /// 首次 evaluate 之前调用且只调用一次；失败即启动失败
    fn initialize(&mut self, _context: &StartupContext) -> Result<(), BackendError> {
        Ok(())
    }

    /// 求值一条命令，响应与请求一一对应，会话 ID 原样带回
    fn evaluate(&mut self, input: &Input) -> Result<Output, BackendError>;
}

impl<B: EngineBackend + ?Sized> EngineBackend for Box<B> {
    fn initialize(&mut self, context: &StartupContext) -> Result<(), BackendError> {
        (**self).initialize(context)
    }

    fn evaluate(&mut self, input: &Input) -> Result<Output, BackendError> {
        (**self).evaluate(input)
    }
}
