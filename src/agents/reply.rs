//! Report Node
//!
//! Final step of the pipeline and tool branches. Publishes the pipeline
//! report (Markdown and PDF), emits the download links, then streams a short
//! summary. When the model is unavailable a static summary is sent instead.

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::chat::stream_answer;
use super::events::AgentEvent;
use super::graph::{GraphNode, NodeId};
use super::prompts;
use super::state::AgentState;
use super::AgentContext;
use crate::pipeline::{PipelineReport, PipelineStatus};
use crate::report;
use crate::types::{AppResult, Language, LLMMessage};

pub struct ReportNode;

impl ReportNode {
    /// Summary built from the numbers alone
    pub fn static_summary(report: &PipelineReport, language: Language) -> String {
        let funnel = report
            .steps
            .iter()
            .map(|s| format!("{} {}/{}", s.step, s.passed_count, s.input_count))
            .collect::<Vec<_>>()
            .join(", ");
        let top = report
            .candidates
            .iter()
            .take(3)
            .map(|c| format!("{} ({})", c.peptide, c.allele))
            .collect::<Vec<_>>()
            .join(", ");

        match (language, &report.status) {
            (Language::En, PipelineStatus::NoCandidates { step }) => format!(
                "The pipeline stopped at step {} because no candidate passed the filter. Funnel (passed/input): {}.",
                step, funnel
            ),
            (Language::Zh, PipelineStatus::NoCandidates { step }) => format!(
                "流程在第 {} 步终止，没有候选通过筛选。各步通过/输入：{}。",
                step, funnel
            ),
            (Language::En, PipelineStatus::Completed) => format!(
                "The pipeline finished with {} candidate(s). Funnel (passed/input): {}. Top candidates: {}.",
                report.candidates.len(),
                funnel,
                top
            ),
            (Language::Zh, PipelineStatus::Completed) => format!(
                "流程完成，共 {} 个候选。各步通过/输入：{}。最优候选：{}。",
                report.candidates.len(),
                funnel,
                top
            ),
        }
    }

    async fn summarise_pipeline(state: &mut AgentState, ctx: &AgentContext, report: &PipelineReport) -> String {
        match report::publish(&ctx.storage, report, state.language, &ctx.report).await {
            Ok(links) => {
                for link in &links {
                    ctx.events.send(AgentEvent::from_output(link)).await;
                }
                state.report_links.extend(links);
            }
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "Failed to publish report");
                ctx.events.send(AgentEvent::text(e.to_string())).await;
            }
        }

        let markdown = report::render_markdown(report, state.language);
        let request = ctx
            .llm
            .request(vec![LLMMessage::user(markdown)])
            .with_system(prompts::report(state.language));

        match stream_answer(ctx, &request).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Summary generation failed, sending static summary");
                let summary = Self::static_summary(report, state.language);
                ctx.events.send(AgentEvent::text(summary.clone())).await;
                summary
            }
        }
    }
}

#[async_trait]
impl GraphNode for ReportNode {
    fn id(&self) -> NodeId {
        NodeId::Report
    }

    async fn run(&self, state: &mut AgentState, ctx: &AgentContext) -> AppResult<NodeId> {
        let answer = match state.pipeline.clone() {
            Some(report) => Self::summarise_pipeline(state, ctx, &report).await,
            None => {
                let answer = state.draft_answer.clone().unwrap_or_default();
                if !answer.is_empty() {
                    ctx.events.send(AgentEvent::text(answer.clone())).await;
                }
                for link in &state.report_links {
                    ctx.events.send(AgentEvent::from_output(link)).await;
                }
                answer
            }
        };

        info!(thread_id = %state.thread_id, links = state.report_links.len(), "Report delivered");
        state.messages.push(LLMMessage::assistant(answer));
        Ok(NodeId::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::state::PatientFiles;
    use crate::agents::tests::{reply, test_context};
    use crate::pipeline::{Candidate, PipelineInput, StepOutcome, StepStatus};
    use crate::storage::ObjectUrl;
    use crate::tools::ToolOutput;
    use crate::types::AppError;

    fn report() -> PipelineReport {
        PipelineReport {
            run_id: "r1".into(),
            input: PipelineInput {
                mutation_file: ObjectUrl::new("neoagent", "uploads/m.fasta"),
                hla_alleles: vec!["HLA-A02:01".into()],
                cdr3_file: None,
            },
            steps: vec![StepOutcome {
                step: 1,
                name: "Proteasomal cleavage".into(),
                tool: "netchop".into(),
                criterion: "score >= 0.5".into(),
                input_count: 12,
                passed_count: 4,
                status: StepStatus::Completed,
                artifacts: vec![],
                message: String::new(),
            }],
            candidates: vec![Candidate {
                peptide: "GILGFVFTL".into(),
                allele: "HLA-A02:01".into(),
                source: "M1".into(),
                affinity_nm: None,
                rank_el: 0.1,
                immunogenicity: Some(0.8),
                tcr_rank: None,
                cdr3: None,
            }],
            mrna: None,
            status: PipelineStatus::Completed,
        }
    }

    #[test]
    fn test_static_summary() {
        let en = ReportNode::static_summary(&report(), Language::En);
        assert!(en.contains("1 candidate(s)"));
        assert!(en.contains("1 4/12"));
        assert!(en.contains("GILGFVFTL (HLA-A02:01)"));

        let mut stopped = report();
        stopped.status = PipelineStatus::NoCandidates { step: 1 };
        assert!(ReportNode::static_summary(&stopped, Language::Zh).contains("第 1 步终止"));
    }

    #[tokio::test]
    async fn test_publishes_links_and_falls_back_to_static_summary() {
        let (ctx, mut rx) = test_context(vec![Err(AppError::LLMApi("down".into()))]);
        let mut state = AgentState::new("t1");
        state.begin_turn("run it", PatientFiles::default());
        state.pipeline = Some(report());

        assert_eq!(ReportNode.run(&mut state, &ctx).await.unwrap(), NodeId::End);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let links: Vec<&AgentEvent> = events.iter().filter(|e| matches!(e, AgentEvent::Link { .. })).collect();
        assert_eq!(links.len(), 2);
        assert!(matches!(events.last(), Some(AgentEvent::Text { content }) if content.contains("finished with 1")));
        assert_eq!(state.report_links.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_branch_sends_draft_and_links() {
        let (ctx, mut rx) = test_context(vec![Ok(reply("unused"))]);
        let mut state = AgentState::new("t1");
        state.begin_turn("fold", PatientFiles::default());
        state.draft_answer = Some("Folded.".into());
        state.report_links.push(ToolOutput::link("http://minio/x.pdb", "Structure"));

        ReportNode.run(&mut state, &ctx).await.unwrap();
        assert_eq!(rx.recv().await, Some(AgentEvent::text("Folded.")));
        assert_eq!(
            rx.recv().await,
            Some(AgentEvent::Link {
                url: "http://minio/x.pdb".into(),
                content: "Structure".into()
            })
        );
        assert_eq!(state.messages.last().map(|m| m.content.as_str()), Some("Folded."));
    }
}
