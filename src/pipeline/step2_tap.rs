// Step 2: TAP transport

use std::collections::HashSet;

use super::step1_cleavage::{peptides_to_fasta, CleavageResult};
use super::{Artifact, Peptide, PipelineContext, PipelineError, StepOutcome};
use crate::table::{Comparison, Filter};
use crate::tools::nettap::NetTapRequest;

pub const NAME: &str = "TAP transport";

pub struct TransportResult {
    pub peptides: Vec<Peptide>,
    pub fasta: Artifact,
}

pub async fn run(
    ctx: &PipelineContext,
    run_id: &str,
    cleaved: &CleavageResult,
) -> Result<(StepOutcome, TransportResult), PipelineError> {
    let threshold = ctx.thresholds.tap_score_min;
    let output = ctx
        .services
        .nettap
        .predict(&NetTapRequest {
            input_file: cleaved.fasta.url.to_string(),
            peptide_length: Some(ctx.peptide_lengths_arg()),
        })
        .await?;
    let table = ctx.fetch_table(&output, "nettap").await?;

    let score_col = table.require_any_column(&["TAP", "TAP_score", "score"])?;
    let filter = Filter::new(table.headers[score_col].clone(), Comparison::Ge, threshold);
    let passing = table.filter(&filter)?;
    let pep_col = passing.require_any_column(&["Peptide", "peptide", "pep"])?;
    let transported: HashSet<&str> = (0..passing.len())
        .filter_map(|row| passing.cell(row, pep_col))
        .collect();

    let peptides: Vec<Peptide> = cleaved
        .peptides
        .iter()
        .filter(|p| transported.contains(p.sequence.as_str()))
        .cloned()
        .collect();

    let fasta = ctx
        .upload_artifact(run_id, "step2_tap.fasta", "TAP-transported peptides", peptides_to_fasta(&peptides).into_bytes())
        .await?;

    let outcome = StepOutcome::new(2, NAME, "nettap", filter.to_string(), cleaved.peptides.len(), peptides.len())
        .with_artifact(fasta.clone())
        .with_message(format!(
            "{} of {} peptides reach the ER with TAP score >= {}",
            peptides.len(),
            cleaved.peptides.len(),
            threshold
        ));

    Ok((outcome, TransportResult { peptides, fasta }))
}
