// 模拟补全提供商
//
// 用于测试：按脚本逐片段产出文本，或在指定位置失败

use async_trait::async_trait;
use futures::stream;

use crate::ports::{
    ChunkStream, CompletionProvider, CompletionRequest, CompletionResponse, FinishReason,
    ProviderError, StreamChunk,
};

/// 脚本化的模拟提供商
pub struct MockProvider {
    fragments: Vec<String>,
    /// 在第 N 个片段之后注入错误；None 表示正常完成
    fail_after: Option<usize>,
    error_message: String,
}

impl MockProvider {
    /// 正常完成的脚本
    pub fn with_fragments(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail_after: None,
            error_message: String::new(),
        }
    }

    /// 产出前 `after` 个片段后以给定消息失败
    pub fn failing_after(after: usize, fragments: &[&str], message: impl Into<String>) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail_after: Some(after),
            error_message: message.into(),
        }
    }

    /// 立即失败的脚本
    pub fn failing(message: impl Into<String>) -> Self {
        Self::failing_after(0, &[], message)
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        if let Some(0) = self.fail_after {
            return Err(ProviderError::Unknown(self.error_message.clone()));
        }

        Ok(CompletionResponse {
            content: self.fragments.concat(),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn complete_stream(&self, _request: CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let total = self.fragments.len();
        let mut items: Vec<Result<StreamChunk, ProviderError>> = Vec::new();

        for (i, fragment) in self.fragments.iter().enumerate() {
            if let Some(after) = self.fail_after {
                if i >= after {
                    break;
                }
            }
            items.push(Ok(StreamChunk {
                content: fragment.clone(),
                finish_reason: if i + 1 == total {
                    Some(FinishReason::Stop)
                } else {
                    None
                },
            }));
        }

        if self.fail_after.is_some() {
            items.push(Err(ProviderError::Unknown(self.error_message.clone())));
        }

        Ok(Box::pin(stream::iter(items)))
    }
}
