//! Pipeline reports
//!
//! A finished (or short-circuited) [`PipelineReport`] is rendered to Markdown,
//! converted to a branded PDF and both files are uploaded next to the run's
//! artifacts.

pub mod pdf;

use std::fmt::Write as _;

use thiserror::Error;
use tracing::info;

use crate::config::ReportConfig;
use crate::pipeline::{PipelineReport, PipelineStatus, StepStatus};
use crate::storage::{Storage, StorageError};
use crate::tools::ToolOutput;
use crate::types::Language;

pub use pdf::render_pdf;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<lopdf::Error> for ReportError {
    fn from(e: lopdf::Error) -> Self {
        ReportError::Pdf(e.to_string())
    }
}

struct Labels {
    title: &'static str,
    run: &'static str,
    generated: &'static str,
    patient: &'static str,
    mutation_file: &'static str,
    hla: &'static str,
    cdr3: &'static str,
    not_provided: &'static str,
    funnel: &'static str,
    funnel_header: &'static str,
    candidates: &'static str,
    candidates_header: &'static str,
    no_candidates: &'static str,
    stopped: &'static str,
    mrna: &'static str,
    epitopes: &'static str,
    construct: &'static str,
    length: &'static str,
    files: &'static str,
    disclaimer: &'static str,
}

const EN: Labels = Labels {
    title: "Neoantigen Selection Report",
    run: "Run",
    generated: "Generated",
    patient: "Patient inputs",
    mutation_file: "Mutation sequences",
    hla: "HLA alleles",
    cdr3: "TCR CDR3 repertoire",
    not_provided: "not provided",
    funnel: "Filtering funnel",
    funnel_header: "| Step | Tool | Criterion | Input | Passed | Status |",
    candidates: "Candidate neoantigens",
    candidates_header: "| Peptide | HLA | Source | Aff (nM) | %Rank_EL | BigMHC-IM | TCR rank | CDR3 |",
    no_candidates: "No candidate passed every filter.",
    stopped: "The pipeline stopped at step",
    mrna: "mRNA construct",
    epitopes: "Epitopes",
    construct: "Protein construct",
    length: "Length",
    files: "Files",
    disclaimer: "Predictions are computational and for research use only. They are not a clinical recommendation.",
};

const ZH: Labels = Labels {
    title: "新抗原筛选报告",
    run: "运行编号",
    generated: "生成时间",
    patient: "患者输入",
    mutation_file: "突变序列",
    hla: "HLA 分型",
    cdr3: "TCR CDR3 序列",
    not_provided: "未提供",
    funnel: "筛选漏斗",
    funnel_header: "| 步骤 | 工具 | 阈值 | 输入 | 通过 | 状态 |",
    candidates: "候选新抗原",
    candidates_header: "| 肽段 | HLA | 来源 | 亲和力 (nM) | %Rank_EL | BigMHC-IM | TCR 排名 | CDR3 |",
    no_candidates: "没有候选肽段通过全部筛选。",
    stopped: "流程终止于步骤",
    mrna: "mRNA 设计",
    epitopes: "表位",
    construct: "蛋白构建体",
    length: "长度",
    files: "文件",
    disclaimer: "以上结果均为计算预测，仅供科研参考，不构成临床建议。",
};

fn labels(language: Language) -> &'static Labels {
    match language {
        Language::En => &EN,
        Language::Zh => &ZH,
    }
}

fn opt(value: Option<f64>, digits: usize) -> String {
    value.map(|v| format!("{:.*}", digits, v)).unwrap_or_else(|| "-".to_string())
}

fn status_label(status: StepStatus, language: Language) -> &'static str {
    match (status, language) {
        (StepStatus::Completed, Language::En) => "completed",
        (StepStatus::Skipped, Language::En) => "skipped",
        (StepStatus::Empty, Language::En) => "empty",
        (StepStatus::Completed, Language::Zh) => "完成",
        (StepStatus::Skipped, Language::Zh) => "跳过",
        (StepStatus::Empty, Language::Zh) => "无结果",
    }
}

/// Markdown report for one pipeline run
pub fn render_markdown(report: &PipelineReport, language: Language) -> String {
    let l = labels(language);
    let mut md = String::new();

    let _ = writeln!(md, "# {}\n", l.title);
    let _ = writeln!(
        md,
        "{}: `{}` · {}: {}\n",
        l.run,
        report.run_id,
        l.generated,
        chrono::Utc::now().format("%Y-%m-%d %H:%M UTC")
    );

    let _ = writeln!(md, "## {}\n", l.patient);
    let _ = writeln!(md, "- {}: `{}`", l.mutation_file, report.input.mutation_file);
    let _ = writeln!(md, "- {}: {}", l.hla, report.input.hla_alleles.join(", "));
    let cdr3 = report
        .input
        .cdr3_file
        .as_ref()
        .map(|u| format!("`{}`", u))
        .unwrap_or_else(|| l.not_provided.to_string());
    let _ = writeln!(md, "- {}: {}\n", l.cdr3, cdr3);

    let _ = writeln!(md, "## {}\n", l.funnel);
    let _ = writeln!(md, "{}", l.funnel_header);
    let _ = writeln!(md, "|---|---|---|---|---|---|");
    for step in &report.steps {
        let _ = writeln!(
            md,
            "| {}. {} | {} | {} | {} | {} | {} |",
            step.step,
            step.name,
            step.tool,
            step.criterion,
            step.input_count,
            step.passed_count,
            status_label(step.status, language)
        );
    }
    md.push('\n');
    if let PipelineStatus::NoCandidates { step } = report.status {
        let _ = writeln!(md, "**{} {}.** {}\n", l.stopped, step, l.no_candidates);
    }

    let _ = writeln!(md, "## {}\n", l.candidates);
    if report.candidates.is_empty() {
        let _ = writeln!(md, "{}\n", l.no_candidates);
    } else {
        let _ = writeln!(md, "{}", l.candidates_header);
        let _ = writeln!(md, "|---|---|---|---|---|---|---|---|");
        for c in &report.candidates {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {:.3} | {} | {} | {} |",
                c.peptide,
                c.allele,
                c.source,
                opt(c.affinity_nm, 1),
                c.rank_el,
                opt(c.immunogenicity, 3),
                opt(c.tcr_rank, 3),
                c.cdr3.as_deref().unwrap_or("-")
            );
        }
        md.push('\n');
    }

    if let Some(mrna) = &report.mrna {
        let _ = writeln!(md, "## {}\n", l.mrna);
        let _ = writeln!(md, "- {}: {}", l.epitopes, mrna.epitopes.join(", "));
        let _ = writeln!(md, "- {}: `{}`", l.construct, mrna.construct);
        let _ = writeln!(md, "- {}: {} nt", l.length, mrna.design.mrna.len());
        let _ = writeln!(md, "- MFE (LinearDesign): {:.2} kcal/mol", mrna.design.mfe);
        let _ = writeln!(md, "- MFE (RNAfold): {:.2} kcal/mol", mrna.structure.mfe);
        let _ = writeln!(md, "- CAI: {:.3}\n", mrna.design.cai);
        let _ = writeln!(md, "```\n{}\n{}\n```\n", mrna.design.mrna, mrna.structure.structure);
    }

    let artifacts: Vec<_> = report.steps.iter().flat_map(|s| s.artifacts.iter()).collect();
    if !artifacts.is_empty() {
        let _ = writeln!(md, "## {}\n", l.files);
        for artifact in artifacts {
            let _ = writeln!(md, "- [{}]({})", artifact.label, artifact.download);
        }
        md.push('\n');
    }

    let _ = writeln!(md, "---\n\n_{}_", l.disclaimer);
    md
}

/// Upload the Markdown and PDF renderings and return download links
pub async fn publish(
    storage: &Storage,
    report: &PipelineReport,
    language: Language,
    config: &ReportConfig,
) -> Result<Vec<ToolOutput>, ReportError> {
    let markdown = render_markdown(report, language);
    let pdf = render_pdf(&markdown, config)?;

    let prefix = format!("neoagent/{}", report.run_id);
    let md_url = storage.put(&format!("{}/report.md", prefix), markdown.into_bytes()).await?;
    let pdf_url = storage.put(&format!("{}/report.pdf", prefix), pdf).await?;
    info!(run_id = %report.run_id, "Published pipeline report");

    Ok(vec![
        ToolOutput::link(storage.download_link(&md_url), "Report (Markdown)"),
        ToolOutput::link(storage.download_link(&pdf_url), "Report (PDF)"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Artifact, Candidate, PipelineInput, StepOutcome};
    use crate::storage::ObjectUrl;

    fn sample_report(status: PipelineStatus) -> PipelineReport {
        PipelineReport {
            run_id: "abc123".into(),
            input: PipelineInput {
                mutation_file: ObjectUrl::new("neoagent", "uploads/mut.fasta"),
                hla_alleles: vec!["HLA-A02:01".into()],
                cdr3_file: None,
            },
            steps: vec![StepOutcome {
                step: 1,
                name: "Proteasomal cleavage".into(),
                tool: "netchop".into(),
                criterion: "score >= 0.5".into(),
                input_count: 40,
                passed_count: 7,
                status: StepStatus::Completed,
                artifacts: vec![Artifact {
                    label: "Cleaved peptides".into(),
                    url: ObjectUrl::new("neoagent", "neoagent/abc123/step1_cleavage.fasta"),
                    download: "http://minio/neoagent/neoagent/abc123/step1_cleavage.fasta".into(),
                }],
                message: String::new(),
            }],
            candidates: vec![Candidate {
                peptide: "GILGFVFTL".into(),
                allele: "HLA-A02:01".into(),
                source: "M1".into(),
                affinity_nm: Some(12.34),
                rank_el: 0.05,
                immunogenicity: Some(0.9),
                tcr_rank: None,
                cdr3: None,
            }],
            mrna: None,
            status,
        }
    }

    #[test]
    fn test_markdown_sections() {
        let md = render_markdown(&sample_report(PipelineStatus::Completed), Language::En);
        assert!(md.starts_with("# Neoantigen Selection Report"));
        assert!(md.contains("| 1. Proteasomal cleavage | netchop | score >= 0.5 | 40 | 7 | completed |"));
        assert!(md.contains("| GILGFVFTL | HLA-A02:01 | M1 | 12.3 | 0.050 | 0.900 | - | - |"));
        assert!(md.contains("- TCR CDR3 repertoire: not provided"));
        assert!(md.contains("- [Cleaved peptides](http://minio/neoagent/neoagent/abc123/step1_cleavage.fasta)"));
        assert!(!md.contains("stopped at step"));
    }

    #[test]
    fn test_markdown_chinese_and_short_circuit() {
        let md = render_markdown(&sample_report(PipelineStatus::NoCandidates { step: 1 }), Language::Zh);
        assert!(md.starts_with("# 新抗原筛选报告"));
        assert!(md.contains("流程终止于步骤 1"));
    }

    #[tokio::test]
    async fn test_publish_uploads_both_formats() {
        let storage = Storage::in_memory("neoagent");
        let config = ReportConfig {
            brand: "NeoAgent".into(),
            watermark: "RESEARCH USE ONLY".into(),
        };
        let links = publish(&storage, &sample_report(PipelineStatus::Completed), Language::En, &config)
            .await
            .unwrap();
        assert_eq!(links.len(), 2);
        assert!(links[0].url().unwrap().ends_with("neoagent/abc123/report.md"));
        assert!(links[1].url().unwrap().ends_with("neoagent/abc123/report.pdf"));

        let pdf = storage
            .download(&ObjectUrl::new("neoagent", "neoagent/abc123/report.pdf"))
            .await
            .unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }
}
