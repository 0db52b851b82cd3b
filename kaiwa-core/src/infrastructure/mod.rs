// Infrastructure Layer
// 基础设施层包含端口的具体实现

pub mod migration;
pub mod provider;
pub mod storage;

// 重导出常用类型
pub use migration::{MigrationPipeline, MigrationReport};
pub use provider::{MockProvider, OpenAiProvider, ProviderConfig};
pub use storage::{FileSessionStore, InMemorySessionStore};
