// 文件持久化会话存储
//
// 每个会话一个 JSON 文件，以会话 ID 为文件名，对应浏览器端
// 以 id 为键的对象存储。旧版的单文件聚合格式由迁移管线处理

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::domain::{Session, SessionId};
use crate::ports::{SessionStore, StorageError};

/// 文件会话存储
///
/// 将每个会话记录存储为 `<data_dir>/sessions/<id>.json`
pub struct FileSessionStore {
    sessions_dir: PathBuf,
    // 初始化结果只计算一次；失败同样粘滞，后续调用观察到同一失败
    ready: OnceCell<Result<(), String>>,
}

impl FileSessionStore {
    /// 创建新的文件会话存储（不做 I/O，真正打开发生在 init）
    ///
    /// # Arguments
    /// * `data_dir` - 应用数据目录路径
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            sessions_dir: data_dir.as_ref().join("sessions"),
            ready: OnceCell::new(),
        }
    }

    fn session_path(&self, id: SessionId) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", id))
    }

    async fn ensure_ready(&self) -> Result<(), StorageError> {
        let result = self
            .ready
            .get_or_init(|| async {
                fs::create_dir_all(&self.sessions_dir)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await;

        result.clone().map_err(StorageError::Init)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn init(&self) -> Result<(), StorageError> {
        self.ensure_ready().await
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        self.ensure_ready().await?;

        let path = self.session_path(id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        let session = serde_json::from_str(&content)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Some(session))
    }

    async fn get_all(&self) -> Result<Vec<Session>, StorageError> {
        self.ensure_ready().await?;

        let mut entries = fs::read_dir(&self.sessions_dir)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| StorageError::Io(e.to_string()))?;

            match serde_json::from_str::<Session>(&content) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    // 单条损坏记录不阻断整体加载
                    warn!("[FileSessionStore] Skipping unreadable record {:?}: {}", path, e);
                }
            }
        }

        Ok(sessions)
    }

    async fn put(&self, session: &Session) -> Result<(), StorageError> {
        self.ensure_ready().await?;

        let content = serde_json::to_string_pretty(session)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        fs::write(self.session_path(session.id()), content)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))
    }

    async fn remove(&self, id: SessionId) -> Result<(), StorageError> {
        self.ensure_ready().await?;

        match fs::remove_file(self.session_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.ensure_ready().await?;

        let mut entries = fs::read_dir(&self.sessions_dir)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Message;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path());

        let mut session = Session::new(Some("Test".to_string()));
        session.push_message(Message::new_user("Hello"));
        let id = session.id();

        store.put(&session).await.unwrap();
        let retrieved = store.get(id).await.unwrap().unwrap();

        assert_eq!(retrieved.title(), "Test");
        assert_eq!(retrieved.message_count(), 1);
        assert_eq!(retrieved.messages()[0].content(), "Hello");
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path());

        assert!(store.get(SessionId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persistence_across_handles() {
        let temp_dir = TempDir::new().unwrap();
        let session = Session::new(Some("Persistent".to_string()));
        let id = session.id();

        {
            let store = FileSessionStore::new(temp_dir.path());
            store.put(&session).await.unwrap();
        }

        // 重新打开存储，验证数据持久化
        {
            let store = FileSessionStore::new(temp_dir.path());
            let retrieved = store.get(id).await.unwrap();
            assert_eq!(retrieved.unwrap().title(), "Persistent");
        }
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path());

        let s1 = Session::new(Some("One".to_string()));
        let s2 = Session::new(Some("Two".to_string()));
        store.put(&s1).await.unwrap();
        store.put(&s2).await.unwrap();

        store.remove(s1.id()).await.unwrap();
        assert!(store.get(s1.id()).await.unwrap().is_none());
        assert_eq!(store.get_all().await.unwrap().len(), 1);

        // 删除不存在的记录是无操作
        store.remove(s1.id()).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_init_is_idempotent_and_concurrent_safe() {
        let temp_dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FileSessionStore::new(temp_dir.path()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.init().await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        store.init().await.unwrap();
    }

    #[tokio::test]
    async fn test_init_failure_is_sticky() {
        let temp_dir = TempDir::new().unwrap();
        // 数据目录位置被一个普通文件占据，create_dir_all 必然失败
        let blocked = temp_dir.path().join("blocked");
        std::fs::write(&blocked, b"not a directory").unwrap();

        let store = FileSessionStore::new(blocked.join("nested"));

        let first = store.init().await;
        assert!(matches!(first, Err(StorageError::Init(_))));

        // 后续调用观察到同一失败，而不是重试成功
        let second = store.init().await;
        assert!(matches!(second, Err(StorageError::Init(_))));
    }

    #[tokio::test]
    async fn test_get_all_skips_corrupt_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path());

        let session = Session::new(Some("Good".to_string()));
        store.put(&session).await.unwrap();

        std::fs::write(
            temp_dir.path().join("sessions").join("corrupt.json"),
            b"{ not json",
        )
        .unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title(), "Good");
    }
}
