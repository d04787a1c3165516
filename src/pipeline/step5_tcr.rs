// Step 5: TCR recognition (pMTnet)
//
// Needs the patient's CDR3β repertoire. Without one the step is skipped and
// every candidate moves on unchanged.

use std::collections::HashMap;

use super::{Candidate, PipelineContext, PipelineError, StepOutcome, StepStatus};
use crate::storage::ObjectUrl;
use crate::table::{Comparison, Filter, Table, TableFormat};
use crate::tools::netmhcpan::normalize_allele;
use crate::tools::pmtnet::PmtNetRequest;

pub const NAME: &str = "TCR recognition";

/// pMTnet writes alleles as `A*02:01`
pub(crate) fn pmtnet_allele(allele: &str) -> String {
    match normalize_allele(allele) {
        Some(norm) => {
            let bare = norm.trim_start_matches("HLA-");
            format!("{}*{}", &bare[..1], &bare[1..])
        }
        None => allele.to_string(),
    }
}

fn is_cdr3(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_uppercase())
}

/// One CDR3 per line, or a table with a `CDR3` column
pub(crate) fn parse_cdr3s(text: &str, file_name: &str) -> Vec<String> {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let tabular = first.contains(',') || first.contains('\t') || first.trim().eq_ignore_ascii_case("cdr3");

    let raw: Vec<String> = if tabular {
        let format = if first.contains('\t') { TableFormat::Tsv } else { TableFormat::from_path(file_name) };
        match Table::parse(text.as_bytes(), format) {
            Ok(table) => match table.require_any_column(&["CDR3", "cdr3b", "CDR3b", "cdr3"]) {
                Ok(col) => (0..table.len())
                    .filter_map(|row| table.cell(row, col).map(str::to_string))
                    .collect(),
                Err(_) => Vec::new(),
            },
            Err(_) => Vec::new(),
        }
    } else {
        text.lines().map(|l| l.trim().to_string()).collect()
    };

    let mut cdr3s: Vec<String> = Vec::new();
    for value in raw.into_iter().map(|v| v.to_uppercase()) {
        if is_cdr3(&value) && !cdr3s.contains(&value) {
            cdr3s.push(value);
        }
    }
    cdr3s
}

pub async fn run(
    ctx: &PipelineContext,
    run_id: &str,
    candidates: Vec<Candidate>,
    cdr3_file: Option<&ObjectUrl>,
) -> Result<(StepOutcome, Vec<Candidate>), PipelineError> {
    let threshold = ctx.thresholds.tcr_rank_max;
    let criterion = format!("Rank <= {}", threshold);
    let total = candidates.len();

    let cdr3s = match cdr3_file {
        Some(url) => parse_cdr3s(&ctx.storage.download_text(url).await?, url.file_name()),
        None => Vec::new(),
    };
    if cdr3s.is_empty() {
        let reason = if cdr3_file.is_some() {
            "CDR3 file contains no CDR3 sequences"
        } else {
            "no CDR3 repertoire provided"
        };
        let mut outcome = StepOutcome::new(5, NAME, "pmtnet", criterion, total, total)
            .with_message(format!("Skipped: {}", reason));
        outcome.status = StepStatus::Skipped;
        return Ok((outcome, candidates));
    }

    let mut pairs = Vec::new();
    for cdr3 in &cdr3s {
        for c in &candidates {
            pairs.push(vec![cdr3.clone(), c.peptide.clone(), pmtnet_allele(&c.allele)]);
        }
    }
    let pairs = Table::new(vec!["CDR3".into(), "Antigen".into(), "HLA".into()], pairs);
    let input = ctx
        .upload_artifact(run_id, "step5_pmtnet_input.csv", "pMTnet input", pairs.to_csv()?)
        .await?;

    let output = ctx
        .services
        .pmtnet
        .predict(&PmtNetRequest {
            input_file: input.url.to_string(),
        })
        .await?;
    let table = ctx.fetch_table(&output, "pmtnet").await?;

    let rank_col = table.require_any_column(&["Rank", "rank"])?;
    let filter = Filter::new(table.headers[rank_col].clone(), Comparison::Le, threshold);
    let passing = table.filter(&filter)?;
    let cdr3_col = passing.require_any_column(&["CDR3"])?;
    let antigen_col = passing.require_any_column(&["Antigen", "peptide"])?;
    let hla_col = passing.require_any_column(&["HLA", "MHC"])?;

    let mut best: HashMap<(String, String), (f64, String)> = HashMap::new();
    for row in 0..passing.len() {
        let (Some(cdr3), Some(antigen), Some(hla), Some(rank)) = (
            passing.cell(row, cdr3_col),
            passing.cell(row, antigen_col),
            passing.cell(row, hla_col),
            passing.numeric(row, rank_col),
        ) else {
            continue;
        };
        let key = (antigen.to_string(), pmtnet_allele(hla));
        match best.get(&key) {
            Some((current, _)) if *current <= rank => {}
            _ => {
                best.insert(key, (rank, cdr3.to_string()));
            }
        }
    }

    let recognised: Vec<Candidate> = candidates
        .into_iter()
        .filter_map(|c| {
            let (rank, cdr3) = best.get(&(c.peptide.clone(), pmtnet_allele(&c.allele)))?.clone();
            Some(Candidate {
                tcr_rank: Some(rank),
                cdr3: Some(cdr3),
                ..c
            })
        })
        .collect();

    let mut result_rows = Table::new(
        vec!["mhc".into(), "pep".into(), "immunogenicity".into(), "cdr3".into(), "tcr_rank".into()],
        Vec::new(),
    );
    for c in &recognised {
        result_rows.rows.push(vec![
            c.allele.clone(),
            c.peptide.clone(),
            c.immunogenicity.map(|v| v.to_string()).unwrap_or_default(),
            c.cdr3.clone().unwrap_or_default(),
            c.tcr_rank.map(|v| v.to_string()).unwrap_or_default(),
        ]);
    }
    let csv = ctx
        .upload_artifact(run_id, "step5_tcr.csv", "TCR-recognised candidates", result_rows.to_csv()?)
        .await?;

    let outcome = StepOutcome::new(5, NAME, "pmtnet", filter.to_string(), total, recognised.len())
        .with_artifact(csv)
        .with_artifact(input)
        .with_message(format!(
            "{} of {} candidates are recognised by one of {} CDR3s with rank <= {}",
            recognised.len(),
            total,
            cdr3s.len(),
            threshold
        ));

    Ok((outcome, recognised))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pmtnet_allele() {
        assert_eq!(pmtnet_allele("HLA-A02:01"), "A*02:01");
        assert_eq!(pmtnet_allele("B*07:02"), "B*07:02");
        assert_eq!(pmtnet_allele("unknown"), "unknown");
    }

    #[test]
    fn test_parse_cdr3_lines() {
        let cdr3s = parse_cdr3s("CASSLGQAYEQYF\n\ncassirssyeqyf\nCASSLGQAYEQYF\n", "cdr3.txt");
        assert_eq!(cdr3s, vec!["CASSLGQAYEQYF", "CASSIRSSYEQYF"]);
    }

    #[test]
    fn test_parse_cdr3_table() {
        let text = "sample,CDR3,count\np1,CASSLGQAYEQYF,12\np1,n/a,3\n";
        assert_eq!(parse_cdr3s(text, "repertoire.csv"), vec!["CASSLGQAYEQYF"]);
    }

    #[tokio::test]
    async fn test_skipped_without_repertoire() {
        let fx = super::super::tests::fixture("Peptide,TAP\n").await;
        let candidate = Candidate {
            peptide: "VVGADGVGK".into(),
            allele: "HLA-A11:01".into(),
            source: "KRAS".into(),
            affinity_nm: None,
            rank_el: 0.3,
            immunogenicity: Some(0.7),
            tcr_rank: None,
            cdr3: None,
        };
        let (outcome, kept) = run(&fx.ctx, "run", vec![candidate.clone()], None).await.unwrap();
        assert_eq!(outcome.status, StepStatus::Skipped);
        assert_eq!(outcome.passed_count, 1);
        assert_eq!(kept, vec![candidate]);
    }
}
