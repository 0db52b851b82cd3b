// Domain Layer - 领域层
// 包含实体、值对象与发布给 UI 的聊天状态投影

pub mod chat_state;
pub mod entities;
pub mod time;
pub mod value_objects;

// 重导出常用类型
pub use chat_state::ChatState;
pub use entities::{Message, MessageRole, Session};
pub use value_objects::{MessageId, SessionId};
