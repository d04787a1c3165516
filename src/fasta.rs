//! FASTA reading and writing
//!
//! Mutation inputs and every intermediate peptide set travel between the
//! pipeline steps as FASTA text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const LINE_WIDTH: usize = 60;
const PROTEIN_ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWYX*";

#[derive(Debug, Error, PartialEq)]
pub enum FastaError {
    #[error("FASTA line {0}: sequence data before the first '>' header")]
    SequenceBeforeHeader(usize),

    #[error("FASTA line {0}: header has no identifier")]
    EmptyIdentifier(usize),

    #[error("Record {id}: invalid residue '{residue}' at position {position}")]
    InvalidResidue { id: String, residue: char, position: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastaRecord {
    pub id: String,
    pub description: Option<String>,
    pub sequence: String,
}

impl FastaRecord {
    pub fn new(id: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            sequence: sequence.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 1-based mutated residue declared as `mut_pos=<n>` in the description
    pub fn mutation_position(&self) -> Option<usize> {
        self.description
            .as_deref()?
            .split_whitespace()
            .find_map(|token| token.strip_prefix("mut_pos="))
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|pos| *pos >= 1 && *pos <= self.sequence.len())
    }
}

pub fn parse(text: &str) -> Result<Vec<FastaRecord>, FastaError> {
    let mut records: Vec<FastaRecord> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('>') {
            let header = header.trim();
            let mut parts = header.splitn(2, char::is_whitespace);
            let id = parts.next().unwrap_or_default();
            if id.is_empty() {
                return Err(FastaError::EmptyIdentifier(line_no));
            }
            let description = parts
                .next()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from);
            records.push(FastaRecord {
                id: id.to_string(),
                description,
                sequence: String::new(),
            });
        } else {
            let current = records
                .last_mut()
                .ok_or(FastaError::SequenceBeforeHeader(line_no))?;
            current
                .sequence
                .extend(line.chars().filter(|c| !c.is_whitespace()).map(|c| c.to_ascii_uppercase()));
        }
    }

    Ok(records)
}

pub fn write(records: &[FastaRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push('>');
        out.push_str(&record.id);
        if let Some(desc) = &record.description {
            out.push(' ');
            out.push_str(desc);
        }
        out.push('\n');

        let bytes = record.sequence.as_bytes();
        for chunk in bytes.chunks(LINE_WIDTH) {
            out.push_str(&String::from_utf8_lossy(chunk));
            out.push('\n');
        }
    }
    out
}

pub fn validate_protein(record: &FastaRecord) -> Result<(), FastaError> {
    match record
        .sequence
        .chars()
        .enumerate()
        .find(|(_, c)| !PROTEIN_ALPHABET.contains(*c))
    {
        Some((idx, residue)) => Err(FastaError::InvalidResidue {
            id: record.id.clone(),
            residue,
            position: idx + 1,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multiline_records() {
        let text = ">KRAS_G12D mut_pos=12 gene=KRAS\nMTEYKLVVVGA\ndgvgkSALTIQ\n\n>TP53_R175H\nMEEPQSDPSV\n";
        let records = parse(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "KRAS_G12D");
        assert_eq!(records[0].sequence, "MTEYKLVVVGADGVGKSALTIQ");
        assert_eq!(records[0].description.as_deref(), Some("mut_pos=12 gene=KRAS"));
        assert_eq!(records[0].mutation_position(), Some(12));
        assert_eq!(records[1].description, None);
        assert_eq!(records[1].mutation_position(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("MTEYK\n>a\nAAA"), Err(FastaError::SequenceBeforeHeader(1)));
        assert_eq!(parse(">a\nAAA\n>  \nCCC"), Err(FastaError::EmptyIdentifier(3)));
        assert_eq!(parse("\n\n").unwrap(), vec![]);
    }

    #[test]
    fn test_write_wraps_long_sequences() {
        let record = FastaRecord::new("long", "A".repeat(130)).with_description("demo");
        let text = write(&[record]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ">long demo");
        assert_eq!(lines[1].len(), 60);
        assert_eq!(lines[2].len(), 60);
        assert_eq!(lines[3].len(), 10);
    }

    #[test]
    fn test_mutation_position_out_of_range_is_ignored() {
        let record = FastaRecord::new("x", "ACDE").with_description("mut_pos=9");
        assert_eq!(record.mutation_position(), None);
    }

    #[test]
    fn test_validate_protein() {
        assert!(validate_protein(&FastaRecord::new("ok", "ACDEFGHIKLMNPQRSTVWY")).is_ok());
        let err = validate_protein(&FastaRecord::new("bad", "ACBD")).unwrap_err();
        assert_eq!(
            err,
            FastaError::InvalidResidue { id: "bad".into(), residue: 'B', position: 3 }
        );
    }
}
