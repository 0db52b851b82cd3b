use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// 补全提供商错误
///
/// 对注册表而言一律可恢复：永远不会越过发布边界抛出，
/// 而是转换为 ChatState.error 字段
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {code} - {message}")]
    Api { code: String, message: String },

    #[error("API Key is missing. Please add it in Settings.")]
    MissingApiKey,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// 一轮对话（角色 + 内容）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// 补全请求
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// 消息历史（按原始顺序）
    pub messages: Vec<ChatTurn>,
    /// 温度参数
    pub temperature: Option<f32>,
    /// 最大生成 token 数
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatTurn>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

/// 结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

/// 补全响应（非流式）
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub finish_reason: FinishReason,
}

/// 流式响应片段
#[derive(Debug, Clone)]
pub struct StreamChunk {
    /// 增量文本
    pub content: String,
    /// 结束原因（最后一个片段才有）
    pub finish_reason: Option<FinishReason>,
}

/// 片段流类型
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// 流式补全提供商端口
///
/// 接收有序的角色/内容对，产出异步文本片段序列，
/// 以正常完成或携带可读消息的错误终止
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 单次补全请求
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// 流式补全请求
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream, ProviderError>;
}
