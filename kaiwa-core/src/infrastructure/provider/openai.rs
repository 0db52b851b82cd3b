// OpenAI 兼容补全提供商
//
// 通过 chat/completions 接口实现非流式与 SSE 流式补全

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::ports::{
    ChunkStream, CompletionProvider, CompletionRequest, CompletionResponse, FinishReason,
    ProviderError, StreamChunk,
};

/// 默认温度参数（未显式指定时使用）
const DEFAULT_TEMPERATURE: f32 = 0.7;
/// 默认最大生成 token 数
const DEFAULT_MAX_TOKENS: u32 = 1000;

/// 提供商配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 60,
        }
    }
}

/// OpenAI 兼容适配器
pub struct OpenAiProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiProvider {
    /// 创建新的适配器实例
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// 获取 API URL
    fn api_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn check_api_key(&self) -> Result<(), ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }
        Ok(())
    }

    /// 转换为 OpenAI 请求格式
    fn to_openai_request(&self, request: &CompletionRequest, stream: bool) -> OpenAiRequest {
        OpenAiRequest {
            model: self.config.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            stream: if stream { Some(true) } else { None },
        }
    }

    async fn post(&self, body: &OpenAiRequest) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.api_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("[OpenAiProvider] API error: {} - {}", status, error_text);

            // 优先取 API 返回的可读错误消息
            let message = serde_json::from_str::<OpenAiErrorBody>(&error_text)
                .map(|body| body.error.message)
                .unwrap_or(error_text);

            return Err(ProviderError::Api {
                code: status.as_str().to_string(),
                message,
            });
        }

        Ok(response)
    }

    /// 解析 SSE 行
    fn parse_sse_line(line: &str) -> Option<OpenAiStreamResponse> {
        let line = line.trim();
        if !line.starts_with("data: ") {
            return None;
        }

        let data = &line[6..];
        if data == "[DONE]" {
            return None;
        }

        // 无法解析的载荷直接跳过
        serde_json::from_str(data).ok()
    }

    fn map_finish_reason(reason: &str) -> Option<FinishReason> {
        match reason {
            "stop" => Some(FinishReason::Stop),
            "length" => Some(FinishReason::Length),
            "content_filter" => Some(FinishReason::ContentFilter),
            _ => None,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.check_api_key()?;
        let openai_request = self.to_openai_request(&request, false);

        debug!("[OpenAiProvider] Completion request: model={}", openai_request.model);

        let response = self.post(&openai_request).await?;

        let openai_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Unknown("No choices in response".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content,
            finish_reason: choice
                .finish_reason
                .as_deref()
                .and_then(Self::map_finish_reason)
                .unwrap_or(FinishReason::Stop),
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream, ProviderError> {
        self.check_api_key()?;
        let openai_request = self.to_openai_request(&request, true);

        debug!("[OpenAiProvider] Streaming request: model={}", openai_request.model);

        let response = self.post(&openai_request).await?;

        // 字节流按行缓冲后逐条解析 SSE 载荷
        let bytes_stream = response.bytes_stream();
        let buffer = String::new();
        let stream = stream::unfold(
            (bytes_stream, buffer),
            |(mut bytes_stream, mut buffer)| async move {
                loop {
                    match bytes_stream.next().await {
                        Some(Ok(bytes)) => {
                            buffer.push_str(&String::from_utf8_lossy(&bytes));

                            while let Some(pos) = buffer.find('\n') {
                                let line = buffer[..pos].to_string();
                                buffer.drain(..=pos);

                                if let Some(sse) = Self::parse_sse_line(&line) {
                                    if let Some(choice) = sse.choices.first() {
                                        if let Some(content) = &choice.delta.content {
                                            let chunk = StreamChunk {
                                                content: content.clone(),
                                                finish_reason: choice
                                                    .finish_reason
                                                    .as_deref()
                                                    .and_then(Self::map_finish_reason),
                                            };
                                            return Some((Ok(chunk), (bytes_stream, buffer)));
                                        }
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            return Some((
                                Err(ProviderError::Network(e.to_string())),
                                (bytes_stream, buffer),
                            ));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

// OpenAI API 类型定义

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        let result = OpenAiProvider::parse_sse_line(line);
        assert!(result.is_some());
    }

    #[test]
    fn test_parse_sse_done() {
        assert!(OpenAiProvider::parse_sse_line("data: [DONE]").is_none());
    }

    #[test]
    fn test_parse_sse_garbage_is_skipped() {
        assert!(OpenAiProvider::parse_sse_line("data: { broken").is_none());
        assert!(OpenAiProvider::parse_sse_line(": keep-alive").is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_rejected() {
        let provider = OpenAiProvider::new(ProviderConfig::default()).unwrap();
        let request = CompletionRequest::new(vec![]);

        let result = provider.complete_stream(request).await;
        assert!(matches!(result, Err(ProviderError::MissingApiKey)));
    }

    #[test]
    fn test_api_url_trims_trailing_slash() {
        let provider = OpenAiProvider::new(ProviderConfig {
            base_url: "https://example.com/v1/".to_string(),
            ..ProviderConfig::default()
        })
        .unwrap();

        assert_eq!(provider.api_url(), "https://example.com/v1/chat/completions");
    }
}
