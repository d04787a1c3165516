//! Tool-call node
//!
//! Function-calling loop: the model either answers or requests tools; each
//! requested tool runs through the registry and its envelope goes back to
//! the model. Bounded by [`MAX_TOOL_ROUNDS`].

use async_trait::async_trait;
use tracing::{info, warn};

use super::events::AgentEvent;
use super::graph::{GraphNode, NodeId};
use super::prompts;
use super::state::AgentState;
use super::AgentContext;
use crate::tools::ToolOutput;
use crate::types::{AppResult, LLMMessage};

pub const MAX_TOOL_ROUNDS: usize = 6;

pub struct ToolCallNode;

/// Link handed to the user for a tool result
///
/// Object-store URLs become download links; other URLs pass through.
fn downloadable(output: &ToolOutput, ctx: &AgentContext) -> Option<ToolOutput> {
    let raw = output.url()?;
    let url = match ctx.storage.parse_url(raw) {
        Ok(object) if object.bucket == ctx.storage.bucket() => ctx.storage.download_link(&object),
        Ok(_) | Err(_) => raw.to_string(),
    };
    Some(ToolOutput::link(url, output.content()))
}

#[async_trait]
impl GraphNode for ToolCallNode {
    fn id(&self) -> NodeId {
        NodeId::ToolCall
    }

    async fn run(&self, state: &mut AgentState, ctx: &AgentContext) -> AppResult<NodeId> {
        let system = format!(
            "{}\n\n{}",
            prompts::tool_call(state.language),
            prompts::files_context(&state.files.describe(), state.language)
        );
        let definitions = ctx.tools.definitions();
        let mut messages = state.messages.clone();
        let mut last_outputs: Vec<ToolOutput> = Vec::new();

        for round in 0..MAX_TOOL_ROUNDS {
            let request = ctx
                .llm
                .request(messages.clone())
                .with_system(system.clone())
                .with_tools(definitions.clone());
            let response = ctx.llm.create_chat_completion(&request).await?;

            if response.tool_calls.is_empty() {
                info!(thread_id = %state.thread_id, rounds = round, "Tool loop finished");
                state.draft_answer = Some(response.content);
                return Ok(NodeId::Report);
            }

            messages.push(LLMMessage::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            last_outputs.clear();

            for call in &response.tool_calls {
                let output = match call.parsed_arguments() {
                    Ok(arguments) => {
                        ctx.events
                            .send(AgentEvent::ToolStart {
                                name: call.name.clone(),
                                arguments: arguments.clone(),
                            })
                            .await;
                        ctx.tools.invoke(&call.name, arguments).await
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Model sent malformed tool arguments");
                        ToolOutput::text(format!("{}: invalid JSON arguments: {}", call.name, e))
                    }
                };

                ctx.events
                    .send(AgentEvent::ToolEnd {
                        name: call.name.clone(),
                        output: output.clone(),
                    })
                    .await;
                if let Some(link) = downloadable(&output, ctx) {
                    state.report_links.push(link);
                }
                messages.push(LLMMessage::tool(call.id.clone(), output.to_json()));
                last_outputs.push(output);
            }
        }

        warn!(thread_id = %state.thread_id, "Tool loop hit the round limit");
        let summary = last_outputs
            .iter()
            .map(|o| o.content().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        state.draft_answer = Some(summary);
        Ok(NodeId::Report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::state::PatientFiles;
    use crate::agents::reply::ReportNode;
    use crate::agents::tests::{reply, test_context};
    use crate::types::{LLMResponse, ToolCall};

    fn call(name: &str, arguments: &str) -> LLMResponse {
        LLMResponse {
            tool_calls: vec![ToolCall {
                id: format!("call_{}", name),
                name: name.into(),
                arguments: arguments.into(),
            }],
            ..reply("")
        }
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let (ctx, mut rx) = test_context(vec![
            Ok(call("echo", r#"{"message":"AUGC folded"}"#)),
            Ok(reply("The structure is open.")),
        ]);
        let mut state = AgentState::new("t1");
        state.begin_turn("fold AUGC", PatientFiles::default());

        let next = ToolCallNode.run(&mut state, &ctx).await.unwrap();
        assert_eq!(next, NodeId::Report);
        assert_eq!(state.draft_answer.as_deref(), Some("The structure is open."));

        assert_eq!(
            rx.recv().await,
            Some(AgentEvent::ToolStart {
                name: "echo".into(),
                arguments: serde_json::json!({"message": "AUGC folded"}),
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(AgentEvent::ToolEnd {
                name: "echo".into(),
                output: ToolOutput::text("AUGC folded"),
            })
        );
    }

    #[tokio::test]
    async fn test_object_links_become_download_links() {
        let (ctx, _rx) = test_context(vec![]);

        let stored = ToolOutput::link("minio://neoagent/results/fold.pdb", "structure");
        assert_eq!(
            downloadable(&stored, &ctx),
            Some(ToolOutput::link("memory://neoagent/results/fold.pdb", "structure"))
        );

        let external = ToolOutput::link("https://esmatlas.com/fold.pdb", "structure");
        assert_eq!(downloadable(&external, &ctx), Some(external.clone()));
        assert_eq!(downloadable(&ToolOutput::text("no file"), &ctx), None);
    }

    #[tokio::test]
    async fn test_tool_link_reaches_report_as_download() {
        let (ctx, mut rx) = test_context(vec![
            Ok(call("echo", r#"{"message":"folded","url":"minio://neoagent/results/fold.pdb"}"#)),
            Ok(reply("Structure ready.")),
        ]);
        let mut state = AgentState::new("t1");
        state.begin_turn("fold this protein", PatientFiles::default());

        ToolCallNode.run(&mut state, &ctx).await.unwrap();
        ReportNode.run(&mut state, &ctx).await.unwrap();

        let mut links = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::Link { url, .. } = event {
                links.push(url);
            }
        }
        assert_eq!(links, vec!["memory://neoagent/results/fold.pdb"]);
    }

    #[tokio::test]
    async fn test_malformed_arguments_reported_to_model() {
        let (ctx, mut rx) = test_context(vec![Ok(call("echo", "{not json")), Ok(reply("sorry"))]);
        let mut state = AgentState::new("t1");
        state.begin_turn("echo", PatientFiles::default());

        ToolCallNode.run(&mut state, &ctx).await.unwrap();
        match rx.recv().await {
            Some(AgentEvent::ToolEnd { output, .. }) => assert!(output.content().contains("invalid JSON")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_round_limit() {
        let script = (0..MAX_TOOL_ROUNDS)
            .map(|_| Ok(call("echo", r#"{"message":"again"}"#)))
            .collect();
        let (ctx, _rx) = test_context(script);
        let mut state = AgentState::new("t1");
        state.begin_turn("loop", PatientFiles::default());

        assert_eq!(ToolCallNode.run(&mut state, &ctx).await.unwrap(), NodeId::Report);
        assert_eq!(state.draft_answer.as_deref(), Some("again"));
    }
}
