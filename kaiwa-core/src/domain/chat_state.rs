use serde::Serialize;

use super::entities::Message;

/// 聊天状态 - 面向 UI 发布的投影，不持久化
///
/// 不变量：`is_loading` 为 true 时，`messages` 末尾恰好有一条
/// `is_typing` 占位消息（固定哨兵 ID）；其余情况下没有占位消息
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    /// 当前展示的消息列表
    pub messages: Vec<Message>,
    /// 是否有流式回复进行中
    pub is_loading: bool,
    /// 初始加载（存储初始化 + 迁移）是否未完成
    pub is_initial_loading: bool,
    /// 错误描述，无错误时为 None
    pub error: Option<String>,
}

impl ChatState {
    /// 启动时的初始状态，初始加载完成后 `is_initial_loading` 翻转且不再回退
    pub fn initial() -> Self {
        Self {
            messages: Vec::new(),
            is_loading: false,
            is_initial_loading: true,
            error: None,
        }
    }

    /// 从持久化消息构建的空闲状态
    pub fn ready(messages: Vec<Message>) -> Self {
        Self {
            messages,
            is_loading: false,
            is_initial_loading: false,
            error: None,
        }
    }

    /// 空状态（无活跃会话）
    pub fn empty() -> Self {
        Self::ready(Vec::new())
    }

    /// 携带错误的状态
    pub fn with_error(messages: Vec<Message>, error: impl Into<String>) -> Self {
        Self {
            messages,
            is_loading: false,
            is_initial_loading: false,
            error: Some(error.into()),
        }
    }

    /// 流式进行中的状态：在展示列表末尾追加占位消息
    pub fn streaming(mut base_messages: Vec<Message>, accumulated: &str) -> Self {
        base_messages.push(Message::typing(accumulated));
        Self {
            messages: base_messages,
            is_loading: true,
            is_initial_loading: false,
            error: None,
        }
    }

    /// 末尾是否为占位消息（测试与不变量检查用）
    pub fn ends_with_placeholder(&self) -> bool {
        self.messages.last().map(|m| m.is_typing()).unwrap_or(false)
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;

    #[test]
    fn test_initial_state() {
        let state = ChatState::initial();
        assert!(state.is_initial_loading);
        assert!(!state.is_loading);
        assert!(state.messages.is_empty());
        assert!(state.error.is_none());
    }

    #[test]
    fn test_streaming_appends_single_placeholder() {
        let base = vec![Message::new_user("hi")];
        let state = ChatState::streaming(base, "partial reply");

        assert!(state.is_loading);
        assert!(state.ends_with_placeholder());
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content(), "partial reply");
        assert_eq!(state.messages[1].id(), MessageId::placeholder());
        assert_eq!(
            state.messages.iter().filter(|m| m.is_typing()).count(),
            1
        );
    }

    #[test]
    fn test_ready_state_has_no_placeholder() {
        let state = ChatState::ready(vec![Message::new_user("hi")]);
        assert!(!state.is_loading);
        assert!(!state.ends_with_placeholder());
    }
}
