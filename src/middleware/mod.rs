// 中间件模块
// 包含API认证、请求日志中间件

pub mod auth;
pub mod logging;

// 重新导出中间件
pub use auth::*;
pub use logging::*;
