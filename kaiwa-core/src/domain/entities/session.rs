use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::value_objects::SessionId;
use super::Message;

/// 标题截断长度（取首条用户消息的前 30 个字符）
const TITLE_MAX_CHARS: usize = 30;

/// 会话实体 - 聚合根
///
/// Session 管理按追加顺序排列的消息集合。持久化布局：
/// 消息内联存储，createdAt/updatedAt 以毫秒数写出
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// 会话唯一标识
    id: SessionId,
    /// 会话标题
    title: String,
    /// 消息列表（追加有序）
    messages: Vec<Message>,
    /// 创建时间
    #[serde(with = "ts_milliseconds")]
    created_at: DateTime<Utc>,
    /// 更新时间
    #[serde(with = "ts_milliseconds")]
    updated_at: DateTime<Utc>,
}

impl Session {
    /// 创建新会话
    pub fn new(title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            title: title.unwrap_or_else(|| "New Chat".to_string()),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 从旧版扁平消息列表合成会话（迁移专用）
    pub fn migrated(messages: Vec<Message>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            title: "Migrated Chat".to_string(),
            messages,
            created_at: now,
            updated_at: now,
        }
    }

    // Getters
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // 业务方法

    /// 追加消息
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// 重命名会话
    pub fn rename(&mut self, new_title: impl Into<String>) {
        self.title = new_title.into();
        self.touch();
    }

    /// 清空消息
    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.touch();
    }

    /// 更新修改时间
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// 根据首条消息内容生成标题（前 30 个字符，截断时追加省略号）
    pub fn derive_title(content: &str) -> String {
        let title: String = content.chars().take(TITLE_MAX_CHARS).collect();
        if content.chars().count() > TITLE_MAX_CHARS {
            format!("{}...", title)
        } else {
            title
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(None)
    }
}
