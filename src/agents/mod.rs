//! Agent System
//!
//! A conversational turn runs through a small state graph:
//!
//! ```text
//! User Message (+ uploaded files)
//!      │
//!      ▼
//! ┌─────────────┐
//! │    Route    │  → pipeline / tool / chat
//! └─────────────┘
//!   │     │     │
//!   │     │     ▼
//!   │     │   ┌──────┐
//!   │     │   │ Chat │ ──────────────┐
//!   │     │   └──────┘               │
//!   │     ▼                          │
//!   │   ┌───────────┐                │
//!   │   │ Tool call │ ─┐             │
//!   │   └───────────┘  │             │
//!   ▼                  ▼             │
//! ┌──────────┐     ┌──────────┐      │
//! │ Pipeline │ ──→ │  Report  │ ──→ End
//! └──────────┘     └──────────┘
//! ```
//!
//! Thread state is checkpointed after every node, so a thread picks up
//! its history and patient files on the next turn.

pub mod chat;
pub mod checkpoint;
pub mod events;
pub mod graph;
pub mod pipeline_node;
pub mod prompts;
pub mod reply;
pub mod router;
pub mod state;
pub mod tool_call;

pub use chat::ChatNode;
pub use checkpoint::{Checkpointer, MemoryCheckpointer};
pub use events::{AgentEvent, EventSink};
pub use graph::{GraphNode, NodeId, StateGraph};
pub use pipeline_node::PipelineNode;
pub use reply::ReportNode;
pub use router::RouteNode;
pub use state::{AgentState, PatientFiles, Route};
pub use tool_call::ToolCallNode;

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{Config, ReportConfig};
use crate::llm::LLM;
use crate::pipeline::PipelineContext;
use crate::storage::Storage;
use crate::tools::{Services, ToolRegistry};
use crate::types::AppResult;

/// Everything a node needs besides the thread state
#[derive(Clone)]
pub struct AgentContext {
    pub llm: Arc<LLM>,
    pub tools: ToolRegistry,
    pub pipeline: PipelineContext,
    pub storage: Storage,
    pub report: ReportConfig,
    pub events: EventSink,
}

/// One user turn
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    pub message: String,
    /// Continue an earlier thread; a new one is started when absent
    pub thread_id: Option<String>,
    pub files: PatientFiles,
}

pub struct Agent {
    llm: Arc<LLM>,
    tools: ToolRegistry,
    pipeline: PipelineContext,
    report: ReportConfig,
    graph: StateGraph,
}

impl Agent {
    pub fn new(llm: Arc<LLM>, tools: ToolRegistry, pipeline: PipelineContext, report: ReportConfig) -> Self {
        Self::with_checkpointer(llm, tools, pipeline, report, Arc::new(MemoryCheckpointer::new()))
    }

    pub fn with_checkpointer(
        llm: Arc<LLM>,
        tools: ToolRegistry,
        pipeline: PipelineContext,
        report: ReportConfig,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        let graph = StateGraph::new(NodeId::Route, checkpointer)
            .add_node(Arc::new(RouteNode))
            .add_node(Arc::new(ToolCallNode))
            .add_node(Arc::new(PipelineNode))
            .add_node(Arc::new(ChatNode))
            .add_node(Arc::new(ReportNode));

        Self {
            llm,
            tools,
            pipeline,
            report,
            graph,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage = Storage::from_config(&config.storage)?;
        let services = Services::from_config(&config.services);
        let tools = ToolRegistry::from_services(&services);
        let pipeline = PipelineContext::new(storage, services, config.pipeline.clone());
        let llm = Arc::new(LLM::new(&config.llm));

        let checkpointer = Arc::new(MemoryCheckpointer::with_capacity(config.server.max_threads));

        info!(model = %llm.model(), tools = ?tools.names(), max_threads = config.server.max_threads, "Agent ready");
        Ok(Self::with_checkpointer(llm, tools, pipeline, config.report.clone(), checkpointer))
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn storage(&self) -> &Storage {
        &self.pipeline.storage
    }

    pub fn pipeline(&self) -> &PipelineContext {
        &self.pipeline
    }

    fn context(&self, events: EventSink) -> AgentContext {
        AgentContext {
            llm: self.llm.clone(),
            tools: self.tools.clone(),
            pipeline: self.pipeline.clone(),
            storage: self.pipeline.storage.clone(),
            report: self.report.clone(),
            events,
        }
    }

    /// Run one turn, streaming events to `events`; always ends with `Done`
    pub async fn run(&self, request: AgentRequest, events: EventSink) -> AppResult<String> {
        let thread_id = request
            .thread_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let checkpointer = self.graph.checkpointer();
        let mut state = match checkpointer.load(&thread_id).await {
            Some(state) => state,
            None => AgentState::new(thread_id.clone()),
        };
        state.begin_turn(&request.message, request.files);

        let ctx = self.context(events.clone());
        let result = self.graph.invoke(&mut state, &ctx).await;

        match &result {
            Ok(path) => info!(thread_id = %thread_id, path = ?path, "Turn complete"),
            Err(e) => {
                error!(thread_id = %thread_id, error = %e, "Turn failed");
                events.send(AgentEvent::text(e.to_string())).await;
                checkpointer.save(&state).await;
            }
        }

        events
            .send(AgentEvent::Done {
                thread_id: thread_id.clone(),
            })
            .await;
        result.map(|_| thread_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::config::{LLMConfig, PipelineConfig, ServicesConfig};
    use crate::llm::LLMAdapter;
    use crate::tools::{parse_args, Tool, ToolError, ToolOutput};
    use crate::types::{AppError, LLMRequest, LLMResponse, TokenUsage};

    pub(crate) fn reply(content: &str) -> LLMResponse {
        LLMResponse {
            content: content.to_string(),
            finish_reason: "stop".to_string(),
            tool_calls: Vec::new(),
            usage: TokenUsage::default(),
        }
    }

    /// Answers requests from a fixed script, in order
    struct ScriptedLlm {
        script: Mutex<VecDeque<AppResult<LLMResponse>>>,
    }

    #[async_trait]
    impl LLMAdapter for ScriptedLlm {
        async fn create_chat_completion(&self, _request: &LLMRequest) -> AppResult<LLMResponse> {
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(AppError::LLMApi("script exhausted".to_string())))
        }
    }

    struct EchoTool;

    #[derive(serde::Deserialize)]
    struct EchoArgs {
        message: String,
        #[serde(default)]
        url: Option<String>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the message back"
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]})
        }

        async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
            let args: EchoArgs = parse_args(self.name(), args)?;
            Ok(match args.url {
                Some(url) => ToolOutput::link(url, args.message),
                None => ToolOutput::text(args.message),
            })
        }
    }

    fn llm_config() -> LLMConfig {
        LLMConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: String::new(),
            model: "test-model".to_string(),
            temperature: 0.0,
            max_tokens: 256,
            timeout_secs: 5,
        }
    }

    fn services_config() -> ServicesConfig {
        let url = "http://127.0.0.1:9".to_string();
        ServicesConfig {
            netchop_url: url.clone(),
            nettap_url: url.clone(),
            netmhcpan_url: url.clone(),
            netmhcstabpan_url: url.clone(),
            bigmhc_url: url.clone(),
            pmtnet_url: url.clone(),
            esmfold_url: url,
            rnafold_cmd: vec!["RNAfold".to_string()],
            lineardesign_cmd: vec!["lineardesign".to_string()],
            timeout_secs: 5,
        }
    }

    fn report_config() -> ReportConfig {
        ReportConfig {
            brand: "NeoAgent".to_string(),
            watermark: "Research Use Only".to_string(),
        }
    }

    fn scripted(script: Vec<AppResult<LLMResponse>>) -> Arc<LLM> {
        let adapter = ScriptedLlm {
            script: Mutex::new(script.into()),
        };
        Arc::new(LLM::with_adapter(Box::new(adapter), &llm_config()))
    }

    fn parts() -> (ToolRegistry, PipelineContext) {
        let storage = Storage::in_memory("neoagent");
        let services = Services::from_config(&services_config());
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool));
        (tools, PipelineContext::new(storage, services, PipelineConfig::default()))
    }

    pub(crate) fn test_context(script: Vec<AppResult<LLMResponse>>) -> (AgentContext, mpsc::Receiver<AgentEvent>) {
        let (events, rx) = EventSink::channel(64);
        let (tools, pipeline) = parts();
        let ctx = AgentContext {
            llm: scripted(script),
            tools,
            storage: pipeline.storage.clone(),
            pipeline,
            report: report_config(),
            events,
        };
        (ctx, rx)
    }

    pub(crate) fn test_agent(script: Vec<AppResult<LLMResponse>>) -> Agent {
        let (tools, pipeline) = parts();
        Agent::new(scripted(script), tools, pipeline, report_config())
    }

    async fn drain(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_chat_turn_end_to_end() {
        let agent = test_agent(vec![Ok(reply("chat")), Ok(reply("Hello! Upload a mutation FASTA to begin."))]);
        let (sink, rx) = EventSink::channel(64);

        let thread_id = agent
            .run(
                AgentRequest {
                    message: "hi there".into(),
                    ..Default::default()
                },
                sink,
            )
            .await
            .unwrap();

        let events = drain(rx).await;
        assert_eq!(
            events,
            vec![
                AgentEvent::Route { route: Route::Chat },
                AgentEvent::text("Hello! Upload a mutation FASTA to begin."),
                AgentEvent::Done { thread_id },
            ]
        );
    }

    #[tokio::test]
    async fn test_thread_keeps_history_and_files() {
        let agent = test_agent(vec![
            Ok(reply("pipeline")),
            Ok(reply("chat")),
            Ok(reply("Your HLA typing is on file.")),
        ]);

        let (sink, rx) = EventSink::channel(64);
        let thread_id = agent
            .run(
                AgentRequest {
                    message: "run the pipeline, HLA-A*02:01".into(),
                    ..Default::default()
                },
                sink,
            )
            .await
            .unwrap();
        let first = drain(rx).await;
        assert!(first
            .iter()
            .any(|e| matches!(e, AgentEvent::Text { content } if content.contains("mutation FASTA"))));

        let (sink, rx) = EventSink::channel(64);
        agent
            .run(
                AgentRequest {
                    message: "what do you have?".into(),
                    thread_id: Some(thread_id.clone()),
                    ..Default::default()
                },
                sink,
            )
            .await
            .unwrap();
        drain(rx).await;

        let state = agent.graph.checkpointer().load(&thread_id).await.unwrap();
        assert_eq!(state.files.hla_alleles, vec!["HLA-A02:01"]);
        assert_eq!(state.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_turn_still_sends_done() {
        let agent = test_agent(vec![Ok(reply("chat"))]);
        let (sink, rx) = EventSink::channel(64);

        let result = agent
            .run(
                AgentRequest {
                    message: "hello".into(),
                    thread_id: Some("t-err".into()),
                    ..Default::default()
                },
                sink,
            )
            .await;
        assert!(result.is_err());

        let events = drain(rx).await;
        assert!(matches!(events.last(), Some(AgentEvent::Done { thread_id }) if thread_id == "t-err"));
        assert!(matches!(&events[events.len() - 2], AgentEvent::Text { content } if content.contains("script exhausted")));
    }
}
