// 会话存储实现

mod file_store;
mod memory_store;

pub use file_store::*;
pub use memory_store::*;
