// Application Layer - 应用层
// 会话注册表及其发布通道

mod channels;
mod registry;

pub use channels::*;
pub use registry::*;

use thiserror::Error;

use super::ports::{ProviderError, StorageError};
use crate::domain::SessionId;

/// 应用层错误类型
///
/// 提供商错误不会出现在这里向上传播的路径中：注册表把它们
/// 转换为 ChatState.error 字段，永远不越过发布边界抛出
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat not found")]
    SessionNotFound(SessionId),

    #[error("A reply is already being generated")]
    GenerationInProgress,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}
