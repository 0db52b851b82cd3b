use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{Session, SessionId};
use crate::ports::{SessionStore, StorageError};

/// 内存会话存储
///
/// 用于开发和测试
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Session>, StorageError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().cloned().collect())
    }

    async fn put(&self, session: &Session) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn remove(&self, id: SessionId) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
        Ok(())
    }
}
