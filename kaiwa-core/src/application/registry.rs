// 会话注册表
//
// 内存中的会话真值源。所有读写都经过这里，订阅方只通过
// StateChannels 观察快照。流式回复期间不持有状态锁：先在锁内
// 追加并持久化用户消息，随后逐片段重发布聊天状态，完成后重新
// 取锁并校验会话仍然活跃才提交最终的助手消息

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use super::{ChatError, StateChannels};
use crate::domain::{ChatState, Message, Session, SessionId};
use crate::infrastructure::MigrationPipeline;
use crate::ports::{
    ChatTurn, CompletionProvider, CompletionRequest, ProviderError, SessionStore,
};

/// 初始加载完成前的内部状态
struct RegistryState {
    sessions: HashMap<SessionId, Session>,
    active_session_id: Option<SessionId>,
    pending_delete_id: Option<SessionId>,
    /// 初始加载完成前记录的激活请求，加载后统一裁决
    requested_session_id: Option<SessionId>,
    initial_loading: bool,
    /// 流式回复进行中的会话，同一时刻至多一个
    streaming_session: Option<SessionId>,
}

/// 会话注册表 - 应用层核心服务
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn CompletionProvider>,
    state: RwLock<RegistryState>,
    channels: StateChannels,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            store,
            provider,
            state: RwLock::new(RegistryState {
                sessions: HashMap::new(),
                active_session_id: None,
                pending_delete_id: None,
                requested_session_id: None,
                initial_loading: true,
                streaming_session: None,
            }),
            channels: StateChannels::new(),
        }
    }

    /// 启动序列：打开存储、运行迁移、装载全部会话
    ///
    /// 存储打开失败是终端状态：发布一次错误后不再重试。
    /// 加载完成后裁决此前记录的激活请求
    pub async fn initialize(&self, data_dir: impl AsRef<Path>) -> Result<(), ChatError> {
        if let Err(e) = self.store.init().await {
            error!("[SessionRegistry] Storage init failed: {}", e);
            let mut state = self.state.write().await;
            state.initial_loading = false;
            state.requested_session_id = None;
            self.channels.publish_chat_state(ChatState::with_error(
                Vec::new(),
                "Failed to initialize storage, please refresh the page",
            ));
            return Err(e.into());
        }

        let report = MigrationPipeline::new(data_dir)
            .run(self.store.as_ref())
            .await;
        if report.bundle_sessions > 0 || report.flat_messages > 0 {
            info!(
                "[SessionRegistry] Migrated {} legacy session(s), {} loose message(s)",
                report.bundle_sessions, report.flat_messages
            );
        }

        let sessions = match self.store.get_all().await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!("[SessionRegistry] Failed to load sessions: {}", e);
                let mut state = self.state.write().await;
                state.initial_loading = false;
                state.requested_session_id = None;
                self.channels
                    .publish_chat_state(ChatState::with_error(Vec::new(), e.to_string()));
                return Err(e.into());
            }
        };

        let mut state = self.state.write().await;
        for session in sessions {
            state.sessions.insert(session.id(), session);
        }
        state.initial_loading = false;

        match state.requested_session_id.take() {
            Some(requested) if state.sessions.contains_key(&requested) => {
                let messages = state.sessions[&requested].messages().to_vec();
                state.active_session_id = Some(requested);
                self.channels.publish_active_session(Some(requested));
                self.channels.publish_chat_state(ChatState::ready(messages));
            }
            Some(requested) => {
                warn!("[SessionRegistry] Requested session {} not found", requested);
                self.channels.publish_active_session(None);
                self.channels
                    .publish_chat_state(ChatState::with_error(Vec::new(), "Chat not found"));
            }
            None => {
                self.channels.publish_chat_state(ChatState::empty());
            }
        }
        self.publish_sessions_locked(&state);

        info!(
            "[SessionRegistry] Initialized with {} session(s)",
            state.sessions.len()
        );
        Ok(())
    }

    /// 创建会话并激活
    pub async fn create_session(&self) -> Result<SessionId, ChatError> {
        let session = Session::new(None);
        let id = session.id();
        self.store.put(&session).await?;

        let mut state = self.state.write().await;
        state.sessions.insert(id, session);
        state.active_session_id = Some(id);
        self.publish_sessions_locked(&state);
        self.channels.publish_active_session(Some(id));
        self.channels.publish_chat_state(ChatState::empty());

        info!("[SessionRegistry] Created session {}", id);
        Ok(id)
    }

    /// 激活会话
    ///
    /// 初始加载完成前只记录请求，加载后裁决；加载完成后：
    /// 重复激活当前会话是空操作，未知 ID 发布 "Chat not found"
    pub async fn activate_session(&self, id: SessionId) {
        let mut state = self.state.write().await;
        if state.initial_loading {
            debug!("[SessionRegistry] Deferring activation of {} until load completes", id);
            state.requested_session_id = Some(id);
            return;
        }
        if state.active_session_id == Some(id) {
            return;
        }

        match state.sessions.get(&id) {
            Some(session) => {
                let messages = session.messages().to_vec();
                state.active_session_id = Some(id);
                self.channels.publish_active_session(Some(id));
                self.channels.publish_chat_state(ChatState::ready(messages));
            }
            None => {
                warn!("[SessionRegistry] Session {} not found", id);
                state.active_session_id = None;
                self.channels.publish_active_session(None);
                self.channels
                    .publish_chat_state(ChatState::with_error(Vec::new(), "Chat not found"));
            }
        }
    }

    /// 取消激活，回到无活跃会话状态
    pub async fn deactivate_session(&self) {
        let mut state = self.state.write().await;
        state.requested_session_id = None;
        if state.active_session_id.is_none() {
            return;
        }
        state.active_session_id = None;
        self.channels.publish_active_session(None);
        self.channels.publish_chat_state(ChatState::empty());
    }

    /// 删除会话；若被删会话正活跃，回到无活跃会话状态
    pub async fn delete_session(&self, id: SessionId) -> Result<(), ChatError> {
        self.store.remove(id).await?;

        let mut state = self.state.write().await;
        state.sessions.remove(&id);
        if state.pending_delete_id == Some(id) {
            state.pending_delete_id = None;
            self.channels.publish_pending_delete(None);
        }
        if state.active_session_id == Some(id) {
            state.active_session_id = None;
            self.channels.publish_active_session(None);
            self.channels.publish_chat_state(ChatState::empty());
        }
        self.publish_sessions_locked(&state);

        info!("[SessionRegistry] Deleted session {}", id);
        Ok(())
    }

    /// 标记待确认删除
    pub async fn request_delete(&self, id: SessionId) {
        let mut state = self.state.write().await;
        if !state.sessions.contains_key(&id) {
            warn!("[SessionRegistry] Delete requested for unknown session {}", id);
            return;
        }
        state.pending_delete_id = Some(id);
        self.channels.publish_pending_delete(Some(id));
    }

    /// 取消待确认删除
    pub async fn cancel_delete(&self) {
        let mut state = self.state.write().await;
        if state.pending_delete_id.take().is_some() {
            self.channels.publish_pending_delete(None);
        }
    }

    /// 确认并执行待确认删除
    pub async fn confirm_delete(&self) -> Result<(), ChatError> {
        let pending = {
            let mut state = self.state.write().await;
            state.pending_delete_id.take()
        };
        if let Some(id) = pending {
            self.channels.publish_pending_delete(None);
            self.delete_session(id).await?;
        }
        Ok(())
    }

    /// 重命名会话
    pub async fn rename_session(&self, id: SessionId, title: &str) -> Result<(), ChatError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::Validation("Title cannot be empty".to_string()));
        }

        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get(&id)
            .ok_or(ChatError::SessionNotFound(id))?;
        let mut updated = session.clone();
        updated.rename(title);
        self.store.put(&updated).await?;
        state.sessions.insert(id, updated);
        self.publish_sessions_locked(&state);
        Ok(())
    }

    /// 清空当前活跃会话的消息
    pub async fn clear_messages(&self) -> Result<(), ChatError> {
        let mut state = self.state.write().await;
        let Some(id) = state.active_session_id else {
            return Ok(());
        };
        let session = state
            .sessions
            .get(&id)
            .ok_or(ChatError::SessionNotFound(id))?;
        let mut updated = session.clone();
        updated.clear_messages();
        self.store.put(&updated).await?;
        state.sessions.insert(id, updated);
        self.publish_sessions_locked(&state);
        self.channels.publish_chat_state(ChatState::empty());
        Ok(())
    }

    /// 发送用户消息并流式获取回复
    ///
    /// 无活跃会话时静默丢弃；空白内容与并发发送被拒绝。
    /// 用户消息先持久化，之后的流式阶段不持锁；提供商失败只
    /// 反映到发布的聊天状态，不向调用方抛出
    pub async fn send_user_message(&self, content: &str) -> Result<(), ChatError> {
        let (session_id, base_messages, request) = {
            let mut state = self.state.write().await;
            let Some(session_id) = state.active_session_id else {
                warn!("[SessionRegistry] Dropping message: no active session");
                return Ok(());
            };
            if state.streaming_session.is_some() {
                return Err(ChatError::GenerationInProgress);
            }
            if content.trim().is_empty() {
                return Err(ChatError::Validation(
                    "Message content cannot be empty".to_string(),
                ));
            }

            let session = state
                .sessions
                .get(&session_id)
                .ok_or(ChatError::SessionNotFound(session_id))?;
            // 先持久化更新后的快照，成功后才落回内存，
            // 写入失败时内存与存储保持一致
            let mut updated = session.clone();
            if updated.message_count() == 0 {
                updated.rename(Session::derive_title(content));
            }
            updated.push_message(Message::new_user(content));
            self.store.put(&updated).await?;

            let base_messages = updated.messages().to_vec();
            state.sessions.insert(session_id, updated);
            state.streaming_session = Some(session_id);
            let request = CompletionRequest::new(
                base_messages
                    .iter()
                    .map(|m| ChatTurn::new(m.role().as_str(), m.content()))
                    .collect(),
            );
            self.publish_sessions_locked(&state);
            self.channels
                .publish_chat_state(ChatState::streaming(base_messages.clone(), ""));
            (session_id, base_messages, request)
        };

        let outcome = self.stream_reply(session_id, request, &base_messages).await;

        let mut state = self.state.write().await;
        state.streaming_session = None;

        match outcome {
            Ok(reply) => {
                if state.active_session_id != Some(session_id) {
                    debug!(
                        "[SessionRegistry] Discarding reply for inactive session {}",
                        session_id
                    );
                    return Ok(());
                }
                let Some(session) = state.sessions.get(&session_id) else {
                    debug!(
                        "[SessionRegistry] Discarding reply for deleted session {}",
                        session_id
                    );
                    return Ok(());
                };
                let persisted_messages = session.messages().to_vec();
                let mut updated = session.clone();
                updated.push_message(Message::new_assistant(reply));
                if let Err(e) = self.store.put(&updated).await {
                    error!("[SessionRegistry] Failed to persist reply: {}", e);
                    // 内存保持已持久化的内容，回复随错误一并丢弃
                    self.channels
                        .publish_chat_state(ChatState::with_error(persisted_messages, e.to_string()));
                    return Err(e.into());
                }
                let messages = updated.messages().to_vec();
                state.sessions.insert(session_id, updated);
                self.channels.publish_chat_state(ChatState::ready(messages));
                self.publish_sessions_locked(&state);
                Ok(())
            }
            Err(e) => {
                warn!("[SessionRegistry] Streaming failed: {}", e);
                if state.active_session_id == Some(session_id) {
                    // 丢弃部分文本，展示列表回到已持久化的消息
                    let messages = state
                        .sessions
                        .get(&session_id)
                        .map(|s| s.messages().to_vec())
                        .unwrap_or_default();
                    self.channels
                        .publish_chat_state(ChatState::with_error(messages, e.to_string()));
                }
                Ok(())
            }
        }
    }

    /// 消费片段流，每个片段重发布一次带占位消息的聊天状态
    ///
    /// 会话在流式期间被删除或切换后停止重发布，避免覆盖
    /// 删除/切换时发布的状态；文本仍继续累积，由提交阶段裁决
    async fn stream_reply(
        &self,
        session_id: SessionId,
        request: CompletionRequest,
        base_messages: &[Message],
    ) -> Result<String, ProviderError> {
        let mut stream = self.provider.complete_stream(request).await?;
        let mut accumulated = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.content.is_empty() {
                continue;
            }
            accumulated.push_str(&chunk.content);

            // 检查与发布在同一把读锁下完成：删除/切换在写锁下发布，
            // 两者串行化，迟到片段不可能覆盖它们刚发布的状态
            {
                let state = self.state.read().await;
                if state.active_session_id == Some(session_id) {
                    self.channels.publish_chat_state(ChatState::streaming(
                        base_messages.to_vec(),
                        &accumulated,
                    ));
                }
            }
        }

        Ok(accumulated)
    }

    fn publish_sessions_locked(&self, state: &RegistryState) {
        let mut list: Vec<Session> = state.sessions.values().cloned().collect();
        list.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        self.channels.publish_sessions(list);
    }

    // 订阅

    pub fn subscribe_sessions(&self) -> watch::Receiver<Vec<Session>> {
        self.channels.subscribe_sessions()
    }

    pub fn subscribe_active_session(&self) -> watch::Receiver<Option<SessionId>> {
        self.channels.subscribe_active_session()
    }

    pub fn subscribe_chat_state(&self) -> watch::Receiver<ChatState> {
        self.channels.subscribe_chat_state()
    }

    pub fn subscribe_pending_delete(&self) -> watch::Receiver<Option<SessionId>> {
        self.channels.subscribe_pending_delete()
    }

    // 当前快照

    pub fn chat_state(&self) -> ChatState {
        self.channels.current_chat_state()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.channels.current_sessions()
    }

    pub fn active_session_id(&self) -> Option<SessionId> {
        self.channels.current_active_session()
    }

    pub fn pending_delete_id(&self) -> Option<SessionId> {
        self.channels.current_pending_delete()
    }
}
