// 状态发布通道
//
// 四条 watch 通道对应对外发布的四个可观察状态：会话列表快照、
// 活跃会话 ID、聊天状态、待确认删除的会话 ID。watch 通道保留
// 最新值，新订阅者立即观察到当前快照；订阅方拿到的都是
// 不可变快照，永远不会拿到可变引用

use tokio::sync::watch;

use crate::domain::{ChatState, Session, SessionId};

pub struct StateChannels {
    sessions: watch::Sender<Vec<Session>>,
    active_session: watch::Sender<Option<SessionId>>,
    chat_state: watch::Sender<ChatState>,
    pending_delete: watch::Sender<Option<SessionId>>,
}

impl StateChannels {
    pub fn new() -> Self {
        let (sessions, _) = watch::channel(Vec::new());
        let (active_session, _) = watch::channel(None);
        let (chat_state, _) = watch::channel(ChatState::initial());
        let (pending_delete, _) = watch::channel(None);

        Self {
            sessions,
            active_session,
            chat_state,
            pending_delete,
        }
    }

    // 发布

    pub fn publish_sessions(&self, sessions: Vec<Session>) {
        self.sessions.send_replace(sessions);
    }

    pub fn publish_active_session(&self, id: Option<SessionId>) {
        self.active_session.send_replace(id);
    }

    pub fn publish_chat_state(&self, state: ChatState) {
        tracing::debug!(
            "[StateChannels] Publishing chat state: {} message(s), loading={}",
            state.messages.len(),
            state.is_loading
        );
        self.chat_state.send_replace(state);
    }

    pub fn publish_pending_delete(&self, id: Option<SessionId>) {
        self.pending_delete.send_replace(id);
    }

    // 订阅

    pub fn subscribe_sessions(&self) -> watch::Receiver<Vec<Session>> {
        self.sessions.subscribe()
    }

    pub fn subscribe_active_session(&self) -> watch::Receiver<Option<SessionId>> {
        self.active_session.subscribe()
    }

    pub fn subscribe_chat_state(&self) -> watch::Receiver<ChatState> {
        self.chat_state.subscribe()
    }

    pub fn subscribe_pending_delete(&self) -> watch::Receiver<Option<SessionId>> {
        self.pending_delete.subscribe()
    }

    // 当前快照

    pub fn current_chat_state(&self) -> ChatState {
        self.chat_state.borrow().clone()
    }

    pub fn current_sessions(&self) -> Vec<Session> {
        self.sessions.borrow().clone()
    }

    pub fn current_active_session(&self) -> Option<SessionId> {
        *self.active_session.borrow()
    }

    pub fn current_pending_delete(&self) -> Option<SessionId> {
        *self.pending_delete.borrow()
    }
}

impl Default for StateChannels {
    fn default() -> Self {
        Self::new()
    }
}
