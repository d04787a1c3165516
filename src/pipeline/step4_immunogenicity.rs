// Step 4: immunogenicity (BigMHC-IM)

use std::collections::HashMap;

use super::step3_affinity::{candidates_table, BindingResult};
use super::{Candidate, PipelineContext, PipelineError, StepOutcome};
use crate::table::{Comparison, Filter};
use crate::tools::bigmhc::BigMhcRequest;
use crate::tools::netmhcpan::normalize_allele;

pub const NAME: &str = "Immunogenicity";

fn allele_key(raw: &str) -> String {
    normalize_allele(raw).unwrap_or_else(|| raw.trim().to_string())
}

pub async fn run(
    ctx: &PipelineContext,
    run_id: &str,
    binders: &BindingResult,
) -> Result<(StepOutcome, Vec<Candidate>), PipelineError> {
    let threshold = ctx.thresholds.immunogenicity_min;
    let output = ctx
        .services
        .bigmhc
        .predict(&BigMhcRequest {
            input_file: binders.csv.url.to_string(),
        })
        .await?;
    let table = ctx.fetch_table(&output, "bigmhc_im").await?;

    let score_col = table.require_any_column(&["BigMHC_IM", "bigmhc_im", "immunogenicity"])?;
    let filter = Filter::new(table.headers[score_col].clone(), Comparison::Ge, threshold);
    let passing = table.filter(&filter)?;
    let pep_col = passing.require_any_column(&["pep", "Peptide"])?;
    let mhc_col = passing.require_any_column(&["mhc", "MHC", "HLA"])?;

    let mut scores: HashMap<(String, String), f64> = HashMap::new();
    for row in 0..passing.len() {
        let (Some(pep), Some(mhc), Some(score)) = (
            passing.cell(row, pep_col),
            passing.cell(row, mhc_col),
            passing.numeric(row, score_col),
        ) else {
            continue;
        };
        let entry = scores.entry((pep.to_string(), allele_key(mhc))).or_insert(score);
        *entry = entry.max(score);
    }

    let immunogenic: Vec<Candidate> = binders
        .candidates
        .iter()
        .filter_map(|c| {
            let score = scores.get(&(c.peptide.clone(), allele_key(&c.allele)))?;
            Some(Candidate {
                immunogenicity: Some(*score),
                ..c.clone()
            })
        })
        .collect();

    let csv = ctx
        .upload_artifact(
            run_id,
            "step4_immunogenicity.csv",
            "Immunogenic candidates",
            candidates_table(&immunogenic).to_csv()?,
        )
        .await?;

    let outcome = StepOutcome::new(
        4,
        NAME,
        "bigmhc_im",
        filter.to_string(),
        binders.candidates.len(),
        immunogenic.len(),
    )
    .with_artifact(csv)
    .with_message(format!(
        "{} of {} binders are predicted immunogenic (BigMHC-IM >= {})",
        immunogenic.len(),
        binders.candidates.len(),
        threshold
    ));

    Ok((outcome, immunogenic))
}
