//! bootstrap - 统一服务启动骨架
//!
//! 运行时初始化、关闭信号与 metrics 导出

mod metrics;
mod runtime;
mod shutdown;

pub use metrics::*;
pub use runtime::*;
pub use shutdown::*;
