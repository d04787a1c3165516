use async_trait::async_trait;
use tracing::{error, info};

use super::events::AgentEvent;
use super::graph::{GraphNode, NodeId};
use super::prompts;
use super::state::AgentState;
use super::AgentContext;
use crate::pipeline;
use crate::types::{AppResult, LLMMessage};

/// Runs steps 1 to 6 once the mutation file and HLA typing are known
pub struct PipelineNode;

#[async_trait]
impl GraphNode for PipelineNode {
    fn id(&self) -> NodeId {
        NodeId::Pipeline
    }

    async fn run(&self, state: &mut AgentState, ctx: &AgentContext) -> AppResult<NodeId> {
        let Some(input) = state.files.to_pipeline_input() else {
            let ask = prompts::missing_inputs(&state.files.missing(), state.language);
            info!(thread_id = %state.thread_id, missing = ?state.files.missing(), "Pipeline inputs incomplete");
            ctx.events.send(AgentEvent::text(ask.clone())).await;
            state.messages.push(LLMMessage::assistant(ask));
            return Ok(NodeId::End);
        };

        match pipeline::run(&ctx.pipeline, input, &ctx.events).await {
            Ok(report) => {
                state.pipeline = Some(report);
                Ok(NodeId::Report)
            }
            Err(e) => {
                error!(thread_id = %state.thread_id, error = %e, "Pipeline failed");
                let message = e.to_string();
                ctx.events.send(AgentEvent::text(message.clone())).await;
                state.messages.push(LLMMessage::assistant(message));
                Ok(NodeId::End)
            }
        }
    }
}
