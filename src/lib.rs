//! IME Executor - 输入法客户端命令调度核心
//!
//! 模块划分：
//! - **client**: 对外门面 ImeClient 与可替换的进程内实例 ClientSlot
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、恢复策略、逻辑时钟、会话状态、关闭信号
//! - **engine**: 引擎后端抽象与 Mock 实现
//! - **executor**: 调度线程、结果投递线程、suggestion 前瞻
//! - **protocol**: 请求 / 响应值对象、按键事件与设置

pub mod client;
pub mod config;
pub mod core;
pub mod engine;
pub mod executor;
pub mod observability;
pub mod protocol;

pub use client::{ClientSlot, ImeClient};
pub use core::{BackendError, DispatchError};
pub use engine::{EngineBackend, MockEngine, StartupContext};
pub use executor::{callback, Callback, Dispatcher, DispatcherConfig};
