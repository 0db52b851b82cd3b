pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

use std::sync::Arc;

pub use application::{ChatError, SessionRegistry, StateChannels};
pub use domain::{ChatState, Message, MessageId, MessageRole, Session, SessionId};
pub use infrastructure::{
    FileSessionStore, InMemorySessionStore, MigrationPipeline, MigrationReport, OpenAiProvider,
    ProviderConfig,
};
pub use ports::{CompletionProvider, ProviderError, SessionStore, StorageError};

/// 初始化日志
///
/// 默认 info 级别，可通过 RUST_LOG 覆盖
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();
}

/// 按默认配置组装注册表：文件存储 + OpenAI 提供商
///
/// 启动序列（打开存储、迁移、装载）由调用方通过
/// `SessionRegistry::initialize` 触发
pub fn bootstrap(
    config: ProviderConfig,
    data_dir: impl Into<std::path::PathBuf>,
) -> Result<Arc<SessionRegistry>, ChatError> {
    let data_dir = data_dir.into();
    let store = Arc::new(FileSessionStore::new(&data_dir));
    let provider = Arc::new(OpenAiProvider::new(config)?);
    Ok(Arc::new(SessionRegistry::new(store, provider)))
}
