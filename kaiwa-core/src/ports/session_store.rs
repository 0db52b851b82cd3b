use async_trait::async_trait;
use thiserror::Error;

use super::super::domain::{Session, SessionId};

/// 存储错误类型
///
/// `Init` 是致命错误：底层存储无法打开时，本进程的持久化能力
/// 即告失效，注册表只将其呈现为一次性的终端错误，不做静默重试。
/// `Io` / `Serialization` 是单次操作错误，调用方可视上下文恢复
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open storage: {0}")]
    Init(String),

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// 会话存储端口
///
/// 以会话 ID 为键的持久化存储，值为完整序列化的 Session 记录
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 打开存储，首次使用时创建会话表
    ///
    /// 可多次调用；已打开的句柄不会重新打开。首次完成前的并发
    /// 调用共享同一结果：要么同一个就绪句柄，要么同一个失败
    async fn init(&self) -> Result<(), StorageError>;

    /// 根据 ID 获取会话
    async fn get(&self, id: SessionId) -> Result<Option<Session>, StorageError>;

    /// 获取全部会话记录
    async fn get_all(&self) -> Result<Vec<Session>, StorageError>;

    /// 保存会话（创建或更新）
    async fn put(&self, session: &Session) -> Result<(), StorageError>;

    /// 删除会话
    async fn remove(&self, id: SessionId) -> Result<(), StorageError>;

    /// 清空全部会话
    async fn clear(&self) -> Result<(), StorageError>;
}
