// OpenAI-compatible chat completions adapter
//
// Built on `async_openai::Client` with the API base taken from config, so it
// works against OpenAI, DeepSeek, Qwen/DashScope, vLLM or Ollama. Supports
// function calling and streamed completions.

use std::future::Future;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use crate::config::LLMConfig;
use crate::llm::provider::{LLMAdapter, TokenStream};
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse, TokenUsage, ToolCall};

pub struct OpenAICompatibleAdapter {
    client: Client<OpenAIConfig>,
    timeout: Duration,
}

fn api_error(e: OpenAIError) -> AppError {
    AppError::LLMApi(format!("LLM API error: {}", e))
}

fn message(m: &LLMMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let message = match m.role.as_str() {
        "system" => ChatCompletionRequestSystemMessageArgs::default()
            .content(m.content.clone())
            .build()?
            .into(),
        "assistant" => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !m.content.is_empty() {
                args.content(m.content.clone());
            }
            if !m.tool_calls.is_empty() {
                args.tool_calls(
                    m.tool_calls
                        .iter()
                        .map(|c| {
                            ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                                id: c.id.clone(),
                                function: FunctionCall {
                                    name: c.name.clone(),
                                    arguments: c.arguments.clone(),
                                },
                            })
                        })
                        .collect::<Vec<_>>(),
                );
            }
            args.build()?.into()
        }
        "tool" => ChatCompletionRequestToolMessageArgs::default()
            .content(m.content.clone())
            .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
            .build()?
            .into(),
        _ => ChatCompletionRequestUserMessageArgs::default()
            .content(m.content.clone())
            .build()?
            .into(),
    };
    Ok(message)
}

/// Map our request onto the typed chat completion request
pub(crate) fn build_request(request: &LLMRequest) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system_instruction {
        messages.push(message(&LLMMessage::new("system", system.clone()))?);
    }
    for m in &request.messages {
        messages.push(message(m)?);
    }

    let mut args = CreateChatCompletionRequestArgs::default();
    args.model(request.model.clone()).messages(messages);
    if let Some(max_tokens) = request.max_tokens {
        #[allow(deprecated)]
        args.max_tokens(max_tokens);
    }
    if let Some(temperature) = request.temperature {
        args.temperature(temperature);
    }
    if !request.tools.is_empty() {
        let tools = request
            .tools
            .iter()
            .map(|t| {
                let function = FunctionObjectArgs::default()
                    .name(t.name.clone())
                    .description(t.description.clone())
                    .parameters(t.parameters.clone())
                    .build()?;
                Ok(ChatCompletionTools::Function(
                    ChatCompletionTool { function },
                ))
            })
            .collect::<Result<Vec<_>, OpenAIError>>()?;
        args.tools(tools);
    }
    args.build()
}

impl OpenAICompatibleAdapter {
    pub fn new(config: &LLMConfig) -> Self {
        let openai = OpenAIConfig::new()
            .with_api_base(config.base_url.trim_end_matches('/'))
            .with_api_key(config.api_key.clone());
        Self {
            client: Client::with_config(openai),
            timeout: config.timeout(),
        }
    }

    async fn timed<T>(&self, call: impl Future<Output = Result<T, OpenAIError>>) -> AppResult<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| AppError::LLMApi(format!("LLM request timed out after {}s", self.timeout.as_secs())))?
            .map_err(api_error)
    }
}

#[async_trait]
impl LLMAdapter for OpenAICompatibleAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let body = build_request(request).map_err(api_error)?;
        debug!(model = %request.model, tools = request.tools.len(), "Sending chat completion");
        let response = self.timed(self.client.chat().create(body)).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMApi("LLM returned no choices".to_string()))?;
        let finish_reason = choice
            .finish_reason
            .and_then(|r| serde_json::to_value(r).ok())
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "stop".to_string());
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|call| match call {
                ChatCompletionMessageToolCalls::Function(call) => Some(ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                }),
                _ => None,
            })
            .collect();
        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason,
            tool_calls,
            usage,
        })
    }

    async fn create_chat_completion_stream(&self, request: &LLMRequest) -> AppResult<TokenStream> {
        let body = build_request(request).map_err(api_error)?;
        debug!(model = %request.model, "Sending streamed chat completion");
        let stream = self.timed(self.client.chat().create_stream(body)).await?;

        let deltas = stream.filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) => chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .filter(|c| !c.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(AppError::LLMApi(format!("Stream interrupted: {}", e)))),
            }
        });
        Ok(deltas.boxed())
    }
}
