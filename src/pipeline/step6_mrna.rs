// Step 6: polyepitope mRNA design
//
// Unique peptides, most immunogenic first, are joined with the linker behind
// a start methionine. LinearDesign picks the codons and RNAfold re-folds the
// result for an independent MFE.

use std::cmp::Ordering;

use super::{Candidate, MrnaResult, PipelineContext, PipelineError, StepOutcome};
use crate::fasta::{self, FastaRecord};

pub const NAME: &str = "mRNA design";

pub(crate) fn rank_epitopes(candidates: &[Candidate]) -> Vec<String> {
    let mut ranked: Vec<&Candidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| {
        let im_a = a.immunogenicity.unwrap_or(f64::MIN);
        let im_b = b.immunogenicity.unwrap_or(f64::MIN);
        im_b.partial_cmp(&im_a)
            .unwrap_or(Ordering::Equal)
            .then(a.rank_el.partial_cmp(&b.rank_el).unwrap_or(Ordering::Equal))
    });

    let mut epitopes: Vec<String> = Vec::new();
    for c in ranked {
        if !epitopes.contains(&c.peptide) {
            epitopes.push(c.peptide.clone());
        }
    }
    epitopes
}

pub(crate) fn build_construct(epitopes: &[String], linker: &str) -> String {
    format!("M{}", epitopes.join(linker))
}

pub async fn run(
    ctx: &PipelineContext,
    run_id: &str,
    candidates: &[Candidate],
) -> Result<(StepOutcome, MrnaResult), PipelineError> {
    let epitopes = rank_epitopes(candidates);
    if epitopes.is_empty() {
        return Err(PipelineError::MissingInput("no epitopes to encode".to_string()));
    }
    let construct = build_construct(&epitopes, &ctx.thresholds.epitope_linker);

    let design = ctx.services.lineardesign.design(&construct).await?;
    let structure = ctx.services.rnafold.fold(&design.mrna).await?;

    let records = vec![
        FastaRecord::new("neoantigen_mrna", design.mrna.clone()).with_description(format!(
            "len={} mfe={:.2} cai={:.3} epitopes={}",
            design.mrna.len(),
            structure.mfe,
            design.cai,
            epitopes.len()
        )),
        FastaRecord::new("neoantigen_protein", construct.clone()),
    ];
    let fasta = ctx
        .upload_artifact(run_id, "step6_mrna.fasta", "mRNA construct", fasta::write(&records).into_bytes())
        .await?;

    let outcome = StepOutcome::new(
        6,
        NAME,
        "lineardesign",
        format!("linker {}", ctx.thresholds.epitope_linker),
        candidates.len(),
        epitopes.len(),
    )
    .with_artifact(fasta)
    .with_message(format!(
        "{} epitopes encoded in {} nt, MFE {:.2} kcal/mol, CAI {:.3}",
        epitopes.len(),
        design.mrna.len(),
        structure.mfe,
        design.cai
    ));

    Ok((
        outcome,
        MrnaResult {
            epitopes,
            construct,
            design,
            structure,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(peptide: &str, im: Option<f64>, rank: f64) -> Candidate {
        Candidate {
            peptide: peptide.into(),
            allele: "HLA-A02:01".into(),
            source: "p".into(),
            affinity_nm: None,
            rank_el: rank,
            immunogenicity: im,
            tcr_rank: None,
            cdr3: None,
        }
    }

    #[test]
    fn test_rank_epitopes_by_immunogenicity() {
        let candidates = vec![
            candidate("AAAAAAAAA", Some(0.6), 0.1),
            candidate("CCCCCCCCC", Some(0.9), 1.5),
            candidate("AAAAAAAAA", Some(0.7), 0.2),
            candidate("DDDDDDDDD", None, 0.1),
            candidate("EEEEEEEEE", Some(0.6), 0.05),
        ];
        assert_eq!(
            rank_epitopes(&candidates),
            vec!["CCCCCCCCC", "AAAAAAAAA", "EEEEEEEEE", "DDDDDDDDD"]
        );
    }

    #[test]
    fn test_build_construct() {
        let epitopes = vec!["SIINFEKL".to_string(), "GILGFVFTL".to_string()];
        assert_eq!(build_construct(&epitopes, "AAY"), "MSIINFEKLAAYGILGFVFTL");
    }
}
