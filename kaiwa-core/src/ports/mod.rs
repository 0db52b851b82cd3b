// Ports Layer
// 端口定义了模块与外部世界的接口

mod provider;
mod session_store;

pub use provider::*;
pub use session_store::*;
