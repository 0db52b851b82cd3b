// 旧版存储迁移管线
//
// 启动期间一次性运行，把两代旧格式转换为当前的按 ID 键控记录：
// - 步骤 A：单文件聚合 `sessions.json`（id -> 会话记录的 JSON 对象）
// - 步骤 B：无会话概念的扁平消息列表 `messages.json`
//
// 两个步骤都可安全地运行零次、一次或多次：旧文件缺失是无操作，
// 成功迁移后旧文件被删除，再次运行同样是无操作。无法解析的
// 旧数据记录日志后按"无可迁移"处理，不中断另一步骤或启动

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::domain::{Message, Session};
use crate::ports::SessionStore;

/// 旧版聚合文件名（旧版本把全部会话写进同一个 JSON 映射）
const LEGACY_BUNDLE_FILE: &str = "sessions.json";

/// 旧版扁平消息文件名（早于会话概念的版本）
const LEGACY_FLAT_FILE: &str = "messages.json";

/// 旧版聚合格式：id -> 完整会话记录
type LegacyBundle = HashMap<String, Session>;

/// 旧版扁平格式：无会话包装的消息数组
type LegacyFlatList = Vec<Message>;

/// 迁移结果统计
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationReport {
    /// 步骤 A 迁移的会话数
    pub bundle_sessions: usize,
    /// 步骤 B 包装进合成会话的消息数
    pub flat_messages: usize,
}

/// 迁移管线
pub struct MigrationPipeline {
    data_dir: PathBuf,
}

impl MigrationPipeline {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// 运行两个迁移步骤
    ///
    /// 任何失败都只记录日志并继续，迁移永远不会让启动失败
    pub async fn run(&self, store: &dyn SessionStore) -> MigrationReport {
        let mut report = MigrationReport::default();

        report.bundle_sessions = self.migrate_session_bundle(store).await;
        report.flat_messages = self.migrate_flat_messages(store).await;

        if report.bundle_sessions > 0 || report.flat_messages > 0 {
            info!(
                "[Migration] Done: {} bundled session(s), {} flat message(s)",
                report.bundle_sessions, report.flat_messages
            );
        }

        report
    }

    /// 步骤 A：聚合文件迁移
    async fn migrate_session_bundle(&self, store: &dyn SessionStore) -> usize {
        let path = self.data_dir.join(LEGACY_BUNDLE_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!("[Migration] Cannot read legacy bundle: {}", e);
                return 0;
            }
        };

        let bundle: LegacyBundle = match serde_json::from_str(&content) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("[Migration] Failed to parse legacy bundle, skipping: {}", e);
                return 0;
            }
        };

        let total = bundle.len();
        let mut migrated = 0usize;
        for session in bundle.into_values() {
            match store.put(&session).await {
                Ok(()) => migrated += 1,
                Err(e) => warn!(
                    "[Migration] Failed to write session {}: {}",
                    session.id(),
                    e
                ),
            }
        }

        // 只有全部写入成功才删除旧文件，否则留待下次启动重试
        if migrated == total {
            if let Err(e) = fs::remove_file(&path).await {
                warn!("[Migration] Failed to remove legacy bundle: {}", e);
            }
        }

        migrated
    }

    /// 步骤 B：扁平消息迁移
    ///
    /// 聚合迁移或既有存储已经有会话时跳过，避免把同一份扁平
    /// 列表重复包装成新会话
    async fn migrate_flat_messages(&self, store: &dyn SessionStore) -> usize {
        let path = self.data_dir.join(LEGACY_FLAT_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!("[Migration] Cannot read legacy messages: {}", e);
                return 0;
            }
        };

        match store.get_all().await {
            Ok(existing) if existing.is_empty() => {}
            Ok(_) => return 0,
            Err(e) => {
                warn!("[Migration] Cannot inspect store, skipping flat migration: {}", e);
                return 0;
            }
        }

        let messages: LegacyFlatList = match serde_json::from_str(&content) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("[Migration] Failed to parse legacy messages, skipping: {}", e);
                return 0;
            }
        };

        if messages.is_empty() {
            // 没有东西可包装，但旧文件照样移除
            if let Err(e) = fs::remove_file(&path).await {
                warn!("[Migration] Failed to remove legacy messages: {}", e);
            }
            return 0;
        }

        let count = messages.len();
        let session = Session::migrated(messages);
        if let Err(e) = store.put(&session).await {
            warn!("[Migration] Failed to write migrated session: {}", e);
            return 0;
        }

        if let Err(e) = fs::remove_file(&path).await {
            warn!("[Migration] Failed to remove legacy messages: {}", e);
        }

        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemorySessionStore;
    use tempfile::TempDir;

    fn write_legacy_bundle(dir: &Path) {
        // 会话时间戳为毫秒数，消息时间戳混用 ISO 字符串与毫秒数
        let bundle = r#"{
            "3f2a8c1e-1111-4aaa-8bbb-000000000001": {
                "id": "3f2a8c1e-1111-4aaa-8bbb-000000000001",
                "title": "First",
                "messages": [
                    {"id": "3f2a8c1e-2222-4aaa-8bbb-000000000002", "content": "hi", "role": "user", "timestamp": "2024-05-01T12:30:00Z"},
                    {"id": "3f2a8c1e-3333-4aaa-8bbb-000000000003", "content": "hello", "role": "assistant", "timestamp": 1714566660000}
                ],
                "createdAt": 1714566600000,
                "updatedAt": 1714566660000
            },
            "3f2a8c1e-4444-4aaa-8bbb-000000000004": {
                "id": "3f2a8c1e-4444-4aaa-8bbb-000000000004",
                "title": "Second",
                "messages": [],
                "createdAt": 1714566700000,
                "updatedAt": 1714566700000
            }
        }"#;
        std::fs::write(dir.join(LEGACY_BUNDLE_FILE), bundle).unwrap();
    }

    #[tokio::test]
    async fn test_bundle_migration() {
        let temp_dir = TempDir::new().unwrap();
        write_legacy_bundle(temp_dir.path());

        let store = InMemorySessionStore::new();
        let pipeline = MigrationPipeline::new(temp_dir.path());

        let report = pipeline.run(&store).await;
        assert_eq!(report.bundle_sessions, 2);

        let sessions = store.get_all().await.unwrap();
        assert_eq!(sessions.len(), 2);

        let first = sessions.iter().find(|s| s.title() == "First").unwrap();
        assert_eq!(first.message_count(), 2);
        // 字符串与毫秒数时间戳都归一化成功
        assert_eq!(first.messages()[0].timestamp().timestamp(), 1714566600);
        assert_eq!(first.messages()[1].timestamp().timestamp(), 1714566660);

        // 旧文件已删除
        assert!(!temp_dir.path().join(LEGACY_BUNDLE_FILE).exists());
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        write_legacy_bundle(temp_dir.path());

        let store = InMemorySessionStore::new();
        let pipeline = MigrationPipeline::new(temp_dir.path());

        pipeline.run(&store).await;
        let count_after_first = store.get_all().await.unwrap().len();

        let report = pipeline.run(&store).await;
        assert_eq!(report.bundle_sessions, 0);
        assert_eq!(report.flat_messages, 0);
        assert_eq!(store.get_all().await.unwrap().len(), count_after_first);
    }

    #[tokio::test]
    async fn test_flat_messages_migration() {
        let temp_dir = TempDir::new().unwrap();
        let flat = r#"[
            {"id": "3f2a8c1e-5555-4aaa-8bbb-000000000005", "content": "old question", "role": "user", "timestamp": "2023-11-02T09:00:00Z"},
            {"id": "3f2a8c1e-6666-4aaa-8bbb-000000000006", "content": "old answer", "role": "assistant", "timestamp": "2023-11-02T09:00:05Z"},
            {"id": "3f2a8c1e-7777-4aaa-8bbb-000000000007", "content": "thanks", "role": "user", "timestamp": 1698915610000}
        ]"#;
        std::fs::write(temp_dir.path().join(LEGACY_FLAT_FILE), flat).unwrap();

        let store = InMemorySessionStore::new();
        let report = MigrationPipeline::new(temp_dir.path()).run(&store).await;

        assert_eq!(report.flat_messages, 3);

        let sessions = store.get_all().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title(), "Migrated Chat");
        assert_eq!(sessions[0].message_count(), 3);

        assert!(!temp_dir.path().join(LEGACY_FLAT_FILE).exists());
    }

    #[tokio::test]
    async fn test_empty_flat_list_removes_file_without_session() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(LEGACY_FLAT_FILE), "[]").unwrap();

        let store = InMemorySessionStore::new();
        let report = MigrationPipeline::new(temp_dir.path()).run(&store).await;

        assert_eq!(report.flat_messages, 0);
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(!temp_dir.path().join(LEGACY_FLAT_FILE).exists());
    }

    #[tokio::test]
    async fn test_flat_skipped_when_sessions_exist() {
        let temp_dir = TempDir::new().unwrap();
        write_legacy_bundle(temp_dir.path());
        let flat = r#"[
            {"id": "3f2a8c1e-8888-4aaa-8bbb-000000000008", "content": "stray", "role": "user", "timestamp": 1698915600000}
        ]"#;
        std::fs::write(temp_dir.path().join(LEGACY_FLAT_FILE), flat).unwrap();

        let store = InMemorySessionStore::new();
        let report = MigrationPipeline::new(temp_dir.path()).run(&store).await;

        assert_eq!(report.bundle_sessions, 2);
        assert_eq!(report.flat_messages, 0);
        assert_eq!(store.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_payloads_do_not_abort_startup() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(LEGACY_BUNDLE_FILE), "{ broken").unwrap();
        let flat = r#"[
            {"id": "3f2a8c1e-9999-4aaa-8bbb-000000000009", "content": "still here", "role": "user", "timestamp": 1698915600000}
        ]"#;
        std::fs::write(temp_dir.path().join(LEGACY_FLAT_FILE), flat).unwrap();

        let store = InMemorySessionStore::new();
        let report = MigrationPipeline::new(temp_dir.path()).run(&store).await;

        // 损坏的聚合文件不阻断扁平列表迁移
        assert_eq!(report.bundle_sessions, 0);
        assert_eq!(report.flat_messages, 1);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_legacy_files_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = InMemorySessionStore::new();

        let report = MigrationPipeline::new(temp_dir.path()).run(&store).await;
        assert_eq!(report.bundle_sessions, 0);
        assert_eq!(report.flat_messages, 0);
    }
}
