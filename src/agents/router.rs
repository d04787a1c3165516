//! Route node
//!
//! Picks the branch for a turn. The model classifies the message; when it
//! fails or answers something unusable, a keyword classifier decides.
//! HLA alleles typed into the message or found in an uploaded HLA file are
//! merged into the patient files on the way.

use async_trait::async_trait;
use tracing::{info, warn};

use super::events::AgentEvent;
use super::graph::{GraphNode, NodeId};
use super::prompts;
use super::state::{AgentState, Route};
use super::AgentContext;
use crate::tools::netmhcpan::extract_alleles;
use crate::types::{AppResult, LLMMessage};

const PIPELINE_KEYWORDS: &[&str] = &[
    "pipeline", "neoantigen", "full analysis", "run all", "vaccine", "screen", "workflow",
    "新抗原", "流程", "筛选", "疫苗",
];

const TOOL_KEYWORDS: &[&str] = &[
    "netchop", "nettap", "netmhcpan", "netmhcstabpan", "bigmhc", "pmtnet", "esmfold", "rnafold",
    "lineardesign", "cleavage", "tap ", "binding", "affinity", "stability", "immunogenicity",
    "structure", "fold", "codon", "mrna",
    "酶切", "结合", "亲和力", "稳定性", "免疫原性", "结构", "折叠", "密码子",
];

/// Keyword fallback used when the model cannot classify
pub fn classify_route(message: &str) -> Route {
    let lower = message.to_lowercase();

    if PIPELINE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Route::Pipeline;
    }
    if TOOL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Route::Tool;
    }
    Route::Chat
}

pub struct RouteNode;

impl RouteNode {
    async fn collect_alleles(state: &mut AgentState, ctx: &AgentContext) {
        let typed = extract_alleles(state.last_user_message());
        if !typed.is_empty() {
            info!(alleles = ?typed, "HLA alleles found in message");
            state.files.add_alleles(typed);
        }

        if state.files.hla_alleles.is_empty() {
            if let Some(url) = state.files.hla_file.clone() {
                match ctx.storage.download_text(&url).await {
                    Ok(text) => state.files.add_alleles(extract_alleles(&text)),
                    Err(e) => warn!(url = %url, error = %e, "Could not read HLA typing file"),
                }
            }
        }
    }

    async fn classify(state: &AgentState, ctx: &AgentContext) -> Route {
        let message = state.last_user_message();
        let request = ctx
            .llm
            .request(vec![LLMMessage::user(message)])
            .with_system(prompts::router(state.language));

        match ctx.llm.create_chat_completion(&request).await {
            Ok(response) => match Route::parse(&response.content) {
                Some(route) => route,
                None => {
                    warn!(answer = %response.content, "Unusable route from model, using keywords");
                    classify_route(message)
                }
            },
            Err(e) => {
                warn!(error = %e, "Route classification failed, using keywords");
                classify_route(message)
            }
        }
    }
}

#[async_trait]
impl GraphNode for RouteNode {
    fn id(&self) -> NodeId {
        NodeId::Route
    }

    async fn run(&self, state: &mut AgentState, ctx: &AgentContext) -> AppResult<NodeId> {
        Self::collect_alleles(state, ctx).await;

        let route = Self::classify(state, ctx).await;
        info!(thread_id = %state.thread_id, route = ?route, "Routed turn");
        state.route = Some(route);
        ctx.events.send(AgentEvent::Route { route }).await;

        Ok(match route {
            Route::Pipeline => NodeId::Pipeline,
            Route::Tool => NodeId::ToolCall,
            Route::Chat => NodeId::Chat,
        })
    }
}
