// Step 1: proteasomal cleavage
//
// Peptides are the k-mers whose C-terminus sits on a predicted cleavage
// site. When a record declares `mut_pos=<n>` only windows covering the
// mutated residue are kept.

use std::collections::HashSet;

use super::{Artifact, Peptide, PipelineContext, PipelineError, StepOutcome};
use crate::fasta::{self, FastaRecord};
use crate::storage::ObjectUrl;
use crate::table::{Comparison, Filter, Table};
use crate::tools::netchop::NetChopRequest;

pub const NAME: &str = "Proteasomal cleavage";

pub struct CleavageResult {
    pub peptides: Vec<Peptide>,
    pub fasta: Artifact,
}

/// Windows of `len` residues ending at each position; `(start, end)` 1-based inclusive
fn windows(record: &FastaRecord, len: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut_pos = record.mutation_position();
    (len..=record.sequence.len())
        .map(move |end| (end + 1 - len, end))
        .filter(move |(start, end)| mut_pos.map_or(true, |m| *start <= m && m <= *end))
}

/// Index of the record a NetChop identifier refers to
///
/// Exact identifiers win. NetChop truncates long identifiers, so otherwise a
/// prefix match is accepted when it points at exactly one record.
fn record_for_ident(records: &[FastaRecord], ident: Option<&str>) -> Option<usize> {
    let Some(ident) = ident.map(str::trim) else {
        return (records.len() == 1).then_some(0);
    };
    if ident.is_empty() {
        return None;
    }
    if let Some(idx) = records.iter().position(|r| r.id == ident) {
        return Some(idx);
    }
    let mut prefixed = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.id.starts_with(ident) || ident.starts_with(r.id.as_str()));
    match (prefixed.next(), prefixed.next()) {
        (Some((idx, _)), None) => Some(idx),
        _ => None,
    }
}

/// `(record index, 1-based position)` of every cleavage site in the table
fn cleavage_sites(
    records: &[FastaRecord],
    table: &Table,
    pos_col: usize,
    ident_col: Option<usize>,
) -> HashSet<(usize, usize)> {
    let mut sites = HashSet::new();
    for row in 0..table.len() {
        let Some(pos) = table.cell(row, pos_col).and_then(|v| v.trim().parse::<usize>().ok()) else {
            continue;
        };
        let ident = ident_col.and_then(|c| table.cell(row, c));
        if let Some(idx) = record_for_ident(records, ident) {
            sites.insert((idx, pos));
        }
    }
    sites
}

pub(crate) fn peptides_to_fasta(peptides: &[Peptide]) -> String {
    let records: Vec<FastaRecord> = peptides
        .iter()
        .map(|p| FastaRecord::new(p.fasta_id(), p.sequence.clone()))
        .collect();
    fasta::write(&records)
}

pub async fn run(
    ctx: &PipelineContext,
    run_id: &str,
    mutation_file: &ObjectUrl,
) -> Result<(StepOutcome, CleavageResult), PipelineError> {
    let text = ctx.storage.download_text(mutation_file).await?;
    let records = fasta::parse(&text)?;
    if records.is_empty() {
        return Err(PipelineError::MissingInput("mutation FASTA has no sequences".to_string()));
    }
    for record in &records {
        fasta::validate_protein(record)?;
    }

    let threshold = ctx.thresholds.cleavage_score_min;
    let output = ctx
        .services
        .netchop
        .predict(&NetChopRequest {
            input_file: mutation_file.to_string(),
            threshold,
        })
        .await?;
    let table = ctx.fetch_table(&output, "netchop").await?;

    let filter = Filter::new("score", Comparison::Ge, threshold);
    let cleaved = table.filter(&filter)?;
    let pos_col = cleaved.require_any_column(&["pos", "Pos", "position"])?;
    let ident_col = cleaved.require_any_column(&["Ident", "ID", "Identity"]).ok();

    let sites = cleavage_sites(&records, &cleaved, pos_col, ident_col);

    let mut considered = 0;
    let mut seen: HashSet<String> = HashSet::new();
    let mut peptides = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        for &len in &ctx.thresholds.peptide_lengths {
            for (start, end) in windows(record, len) {
                considered += 1;
                if !sites.contains(&(idx, end)) {
                    continue;
                }
                let sequence = record.sequence[start - 1..end].to_string();
                if seen.insert(sequence.clone()) {
                    peptides.push(Peptide {
                        sequence,
                        source: record.id.clone(),
                        start,
                    });
                }
            }
        }
    }

    let fasta = ctx
        .upload_artifact(run_id, "step1_cleavage.fasta", "Cleaved peptides", peptides_to_fasta(&peptides).into_bytes())
        .await?;

    let outcome = StepOutcome::new(1, NAME, "netchop", filter.to_string(), considered, peptides.len())
        .with_artifact(fasta.clone())
        .with_message(format!(
            "{} of {} windows end on a cleavage site with score >= {}",
            peptides.len(),
            considered,
            threshold
        ));

    Ok((outcome, CleavageResult { peptides, fasta }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_cover_mutation() {
        let record = FastaRecord::new("KRAS", "MTEYKLVVVGADGVGKSALT").with_description("mut_pos=12");
        let all: Vec<_> = windows(&record, 9).collect();
        assert_eq!(all.len(), 9);
        assert_eq!(all[0], (4, 12));
        assert_eq!(all[8], (12, 20));
    }

    #[test]
    fn test_windows_without_mutation_position() {
        let record = FastaRecord::new("p", "ACDEFGHIK");
        assert_eq!(windows(&record, 8).count(), 2);
        assert_eq!(windows(&record, 10).count(), 0);
    }

    fn netchop_rows(rows: &[&[&str]]) -> Table {
        Table::new(
            vec!["pos".into(), "AA".into(), "C".into(), "score".into(), "Ident".into()],
            rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect(),
        )
    }

    #[test]
    fn test_sites_stay_on_their_record() {
        let records = vec![
            FastaRecord::new("KRAS", "MTEYKLVVVGADGVGKSALTIQ"),
            FastaRecord::new("KRAS_G12D", "MTEYKLVVVGDDGVGKSALTIQ"),
        ];
        let table = netchop_rows(&[&["16", "K", "S", "0.91", "KRAS_G12D"]]);

        let sites = cleavage_sites(&records, &table, 0, Some(4));
        assert_eq!(sites, HashSet::from([(1, 16)]));
    }

    #[test]
    fn test_truncated_ident_matches_single_record() {
        let records = vec![
            FastaRecord::new("TP53_R175H_patient7", "MEEPQSDPSV"),
            FastaRecord::new("KRAS_G12D", "MTEYKLVVVGDDGVGK"),
        ];
        assert_eq!(record_for_ident(&records, Some("TP53_R175H")), Some(0));
        assert_eq!(record_for_ident(&records, Some("BRAF")), None);
        assert_eq!(record_for_ident(&records, Some("")), None);
        assert_eq!(record_for_ident(&records, None), None);
    }

    #[test]
    fn test_ambiguous_prefix_is_dropped() {
        let records = vec![
            FastaRecord::new("KRAS_G12D", "MTEYKLVVVGDDGVGK"),
            FastaRecord::new("KRAS_G12V", "MTEYKLVVVGVDGVGK"),
        ];
        assert_eq!(record_for_ident(&records, Some("KRAS_G12")), None);
        assert_eq!(record_for_ident(&records[..1], None), Some(0));
    }

    #[test]
    fn test_peptides_to_fasta() {
        let peptides = vec![Peptide { sequence: "VVGADGVGK".into(), source: "KRAS".into(), start: 8 }];
        assert_eq!(peptides_to_fasta(&peptides), ">KRAS|8-16\nVVGADGVGK\n");
    }
}
