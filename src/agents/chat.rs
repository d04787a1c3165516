use async_trait::async_trait;
use futures::StreamExt;
use tracing::warn;

use super::events::AgentEvent;
use super::graph::{GraphNode, NodeId};
use super::prompts;
use super::state::AgentState;
use super::AgentContext;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest};

/// Forward a streamed answer as text events and return the full text
pub(crate) async fn stream_answer(ctx: &AgentContext, request: &LLMRequest) -> AppResult<String> {
    let mut stream = ctx.llm.create_chat_completion_stream(request).await?;
    let mut answer = String::new();

    while let Some(delta) = stream.next().await {
        match delta {
            Ok(text) => {
                answer.push_str(&text);
                ctx.events.send(AgentEvent::text(text)).await;
            }
            Err(e) if answer.is_empty() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Answer stream broke off");
                break;
            }
        }
    }

    if answer.is_empty() {
        return Err(AppError::LLMApi("model returned an empty answer".to_string()));
    }
    Ok(answer)
}

/// Plain conversation, no tools
pub struct ChatNode;

#[async_trait]
impl GraphNode for ChatNode {
    fn id(&self) -> NodeId {
        NodeId::Chat
    }

    async fn run(&self, state: &mut AgentState, ctx: &AgentContext) -> AppResult<NodeId> {
        let system = format!(
            "{}\n\n{}",
            prompts::chat(state.language),
            prompts::files_context(&state.files.describe(), state.language)
        );
        let request = ctx.llm.request(state.messages.clone()).with_system(system);

        let answer = stream_answer(ctx, &request).await?;
        state.messages.push(LLMMessage::assistant(answer));
        Ok(NodeId::End)
    }
}
