// Step 3: peptide-MHC binding
//
// Keeps peptide/allele pairs whose NetMHCpan %Rank_EL is at or below the
// threshold and writes them as `mhc,pep,aff_nm,rank_el`, the input layout
// BigMHC expects.

use std::collections::{HashMap, HashSet};

use super::step1_cleavage::peptides_to_fasta;
use super::step2_tap::TransportResult;
use super::{Artifact, Candidate, Peptide, PipelineContext, PipelineError, StepOutcome};
use crate::table::{Comparison, Filter, Table};
use crate::tools::netmhcpan::{normalize_allele, NetMhcPanRequest};

pub const NAME: &str = "MHC binding";

pub struct BindingResult {
    pub candidates: Vec<Candidate>,
    pub csv: Artifact,
}

pub(crate) fn candidates_table(candidates: &[Candidate]) -> Table {
    let mut headers = vec!["mhc", "pep", "aff_nm", "rank_el"];
    let with_im = candidates.iter().any(|c| c.immunogenicity.is_some());
    if with_im {
        headers.push("immunogenicity");
    }
    let rows = candidates
        .iter()
        .map(|c| {
            let mut row = vec![
                c.allele.clone(),
                c.peptide.clone(),
                c.affinity_nm.map(|v| v.to_string()).unwrap_or_default(),
                c.rank_el.to_string(),
            ];
            if with_im {
                row.push(c.immunogenicity.map(|v| v.to_string()).unwrap_or_default());
            }
            row
        })
        .collect();
    Table::new(headers.into_iter().map(String::from).collect(), rows)
}

pub async fn run(
    ctx: &PipelineContext,
    run_id: &str,
    transported: &TransportResult,
    alleles: &[String],
) -> Result<(StepOutcome, BindingResult), PipelineError> {
    let threshold = ctx.thresholds.affinity_rank_max;
    let output = ctx
        .services
        .netmhcpan
        .predict(&NetMhcPanRequest {
            input_file: transported.fasta.url.to_string(),
            hla: alleles.join(","),
            peptide_length: Some(ctx.peptide_lengths_arg()),
        })
        .await?;
    let table = ctx.fetch_table(&output, "netmhcpan").await?;

    let mhc_col = table.require_any_column(&["MHC", "HLA", "Allele"])?;
    let pep_col = table.require_any_column(&["Peptide", "pep"])?;
    let rank_col = table.require_any_column(&["%Rank_EL", "Rank_EL", "EL_Rank", "%Rank"])?;
    let aff_col = table.require_any_column(&["Aff(nM)", "Affinity(nM)", "aff_nm"]).ok();

    let sources: HashMap<&str, &Peptide> = transported
        .peptides
        .iter()
        .map(|p| (p.sequence.as_str(), p))
        .collect();
    let considered = (0..table.len())
        .filter(|row| table.cell(*row, pep_col).is_some_and(|p| sources.contains_key(p)))
        .count();

    let filter = Filter::new(table.headers[rank_col].clone(), Comparison::Le, threshold);
    let binders = table.filter(&filter)?;

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut candidates = Vec::new();
    for row in 0..binders.len() {
        let (Some(peptide), Some(raw_allele), Some(rank_el)) = (
            binders.cell(row, pep_col),
            binders.cell(row, mhc_col),
            binders.numeric(row, rank_col),
        ) else {
            continue;
        };
        let Some(source) = sources.get(peptide) else {
            continue;
        };
        let allele = normalize_allele(raw_allele).unwrap_or_else(|| raw_allele.to_string());
        if !seen.insert((peptide.to_string(), allele.clone())) {
            continue;
        }
        candidates.push(Candidate {
            peptide: peptide.to_string(),
            allele,
            source: source.source.clone(),
            affinity_nm: aff_col.and_then(|c| binders.numeric(row, c)),
            rank_el,
            immunogenicity: None,
            tcr_rank: None,
            cdr3: None,
        });
    }

    let csv_bytes = candidates_table(&candidates).to_csv()?;
    let csv = ctx
        .upload_artifact(run_id, "step3_binding.csv", "MHC binders", csv_bytes)
        .await?;

    let binder_peptides: Vec<Peptide> = transported
        .peptides
        .iter()
        .filter(|p| candidates.iter().any(|c| c.peptide == p.sequence))
        .cloned()
        .collect();
    let fasta = ctx
        .upload_artifact(run_id, "step3_binding.fasta", "MHC binder peptides", peptides_to_fasta(&binder_peptides).into_bytes())
        .await?;

    let outcome = StepOutcome::new(3, NAME, "netmhcpan", filter.to_string(), considered, candidates.len())
        .with_artifact(csv.clone())
        .with_artifact(fasta)
        .with_message(format!(
            "{} peptide/HLA pairs bind {} with {} <= {}",
            candidates.len(),
            alleles.join(", "),
            filter.column,
            threshold
        ));

    Ok((outcome, BindingResult { candidates, csv }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_table_layout() {
        let mut candidate = Candidate {
            peptide: "VVGADGVGK".into(),
            allele: "HLA-A11:01".into(),
            source: "KRAS".into(),
            affinity_nm: Some(45.3),
            rank_el: 0.35,
            immunogenicity: None,
            tcr_rank: None,
            cdr3: None,
        };
        let csv = String::from_utf8(candidates_table(&[candidate.clone()]).to_csv().unwrap()).unwrap();
        assert_eq!(csv, "mhc,pep,aff_nm,rank_el\nHLA-A11:01,VVGADGVGK,45.3,0.35\n");

        candidate.immunogenicity = Some(0.8);
        let table = candidates_table(&[candidate]);
        assert_eq!(table.headers.last().map(String::as_str), Some("immunogenicity"));
    }
}
