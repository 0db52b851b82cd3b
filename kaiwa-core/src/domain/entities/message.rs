use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::time::flexible_timestamp;
use super::super::value_objects::MessageId;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// 用户消息
    User,
    /// AI 助手消息
    Assistant,
    /// 系统消息
    System,
}

impl MessageRole {
    /// 转换为补全接口的角色名
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// 消息实体
///
/// 属于 Session 聚合，按追加顺序存储。`is_typing` 标记流式输出期间
/// 的临时占位消息，占位消息只出现在发布的聊天状态中，不会持久化
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// 消息唯一标识
    id: MessageId,
    /// 消息内容
    content: String,
    /// 消息角色
    role: MessageRole,
    /// 创建时间（旧记录可能反序列化为字符串或毫秒数）
    #[serde(with = "flexible_timestamp")]
    timestamp: DateTime<Utc>,
    /// 是否为流式占位消息
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_typing: bool,
}

impl Message {
    /// 创建用户消息
    pub fn new_user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            role: MessageRole::User,
            timestamp: Utc::now(),
            is_typing: false,
        }
    }

    /// 创建助手消息
    pub fn new_assistant(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            role: MessageRole::Assistant,
            timestamp: Utc::now(),
            is_typing: false,
        }
    }

    /// 创建系统消息
    pub fn new_system(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            role: MessageRole::System,
            timestamp: Utc::now(),
            is_typing: false,
        }
    }

    /// 创建流式占位消息
    ///
    /// 始终使用固定的哨兵 ID，同一次流式调用的每次重发布都复用它
    pub fn typing(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::placeholder(),
            content: content.into(),
            role: MessageRole::Assistant,
            timestamp: Utc::now(),
            is_typing: true,
        }
    }

    // Getters
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    /// 追加内容（用于流式响应）
    pub fn append_content(&mut self, chunk: &str) {
        self.content.push_str(chunk);
    }
}
