use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::config::LLMConfig;
use crate::types::{AppResult, LLMRequest, LLMResponse};

/// Stream of content deltas
pub type TokenStream = BoxStream<'static, AppResult<String>>;

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;

    /// Streamed completion; adapters without streaming yield the whole answer at once
    async fn create_chat_completion_stream(&self, request: &LLMRequest) -> AppResult<TokenStream> {
        let response = self.create_chat_completion(request).await?;
        Ok(futures::stream::once(async move { Ok(response.content) }).boxed())
    }
}

/// The configured model plus its sampling defaults
pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl LLM {
    pub fn new(config: &LLMConfig) -> Self {
        Self::with_adapter(
            Box::new(crate::llm::openai::OpenAICompatibleAdapter::new(config)),
            config,
        )
    }

    pub fn with_adapter(adapter: Box<dyn LLMAdapter>, config: &LLMConfig) -> Self {
        Self {
            adapter,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request for the configured model with the default sampling settings
    pub fn request(&self, messages: Vec<crate::types::LLMMessage>) -> LLMRequest {
        LLMRequest::new(self.model.clone(), messages).with_sampling(self.max_tokens, self.temperature)
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }

    pub async fn create_chat_completion_stream(&self, request: &LLMRequest) -> AppResult<TokenStream> {
        self.adapter.create_chat_completion_stream(request).await
    }
}
