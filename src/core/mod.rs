//! 核心基础设施：错误与恢复、逻辑时钟、会话状态、关闭信号

pub mod clock;
pub mod error;
pub mod recovery;
pub mod session;
pub mod shutdown;

pub use clock::{CancelMark, LogicalClock, Timestamp};
pub use error::{BackendError, DispatchError};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use session::SessionState;
pub use shutdown::{ShutdownManager, ShutdownReason};
