//! 引擎边界：EngineBackend trait 与 Mock 实现

pub mod mock;
pub mod traits;

pub use mock::{MockEngine, MockEngineControl};
pub use traits::{EngineBackend, StartupContext};
