use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 消息唯一标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// 生成新的消息 ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// 流式占位消息的固定哨兵 ID
    ///
    /// 占位消息只存在于发布的聊天状态中，永远不会写入存储。
    /// 所有中间发布共享同一个 ID，订阅方据此跟踪消息身份
    pub fn placeholder() -> Self {
        Self(Uuid::nil())
    }

    /// 是否为占位哨兵 ID
    pub fn is_placeholder(&self) -> bool {
        self.0.is_nil()
    }

    /// 从字符串解析
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// 获取内部 UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<MessageId> for Uuid {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_stable() {
        assert_eq!(MessageId::placeholder(), MessageId::placeholder());
        assert!(MessageId::placeholder().is_placeholder());
    }

    #[test]
    fn test_new_id_is_not_placeholder() {
        assert!(!MessageId::new().is_placeholder());
    }
}
