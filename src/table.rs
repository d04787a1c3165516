//! Tabular prediction results
//!
//! The prediction services write their results as CSV, TSV or XLSX tables.
//! A step reads one back, applies a numeric threshold such as
//! `%Rank_EL <= 2` and keeps the surviving rows.

use std::fmt;
use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use csv::ReaderBuilder;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read table: {0}")]
    Read(String),

    #[error("Table has no header row")]
    Empty,

    #[error("Column '{0}' not found in table")]
    MissingColumn(String),

    #[error("Invalid filter expression '{0}'")]
    InvalidFilter(String),
}

impl From<csv::Error> for TableError {
    fn from(e: csv::Error) -> Self {
        TableError::Read(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Tsv,
    Xlsx,
}

impl TableFormat {
    /// Guess the format from an object key or file name, defaulting to CSV
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_lowercase();
        if lower.ends_with(".xlsx") {
            TableFormat::Xlsx
        } else if lower.ends_with(".tsv") || lower.ends_with(".txt") || lower.ends_with(".xls") {
            TableFormat::Tsv
        } else {
            TableFormat::Csv
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn parse(bytes: &[u8], format: TableFormat) -> Result<Self, TableError> {
        match format {
            TableFormat::Csv => Self::parse_delimited(bytes, b','),
            TableFormat::Tsv => Self::parse_delimited(bytes, b'\t'),
            TableFormat::Xlsx => Self::parse_xlsx(bytes),
        }
    }

    fn parse_delimited(bytes: &[u8], delimiter: u8) -> Result<Self, TableError> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(TableError::Empty);
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.iter().all(|v| v.is_empty()) {
                continue;
            }
            rows.push(record.iter().map(|v| v.to_string()).collect());
        }

        Ok(Self { headers, rows })
    }

    fn parse_xlsx(bytes: &[u8]) -> Result<Self, TableError> {
        let mut workbook: Xlsx<_> =
            Xlsx::new(Cursor::new(bytes.to_vec())).map_err(|e| TableError::Read(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(TableError::Empty)?
            .map_err(|e| TableError::Read(e.to_string()))?;

        let mut rows_iter = range.rows();
        let headers: Vec<String> = rows_iter
            .next()
            .ok_or(TableError::Empty)?
            .iter()
            .map(cell_to_string)
            .collect();

        let rows = rows_iter
            .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|v| !v.is_empty()))
            .collect();

        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column index by exact name, then case-insensitively
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .or_else(|| self.headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
    }

    pub fn require_column(&self, name: &str) -> Result<usize, TableError> {
        self.column(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    /// First of `names` present in the table; services differ on casing and naming
    pub fn require_any_column(&self, names: &[&str]) -> Result<usize, TableError> {
        names
            .iter()
            .find_map(|n| self.column(n))
            .ok_or_else(|| TableError::MissingColumn(names.join(" | ")))
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    pub fn numeric(&self, row: usize, col: usize) -> Option<f64> {
        self.cell(row, col)?.trim().parse::<f64>().ok()
    }

    pub fn filter(&self, filter: &Filter) -> Result<Table, TableError> {
        let col = self.require_column(&filter.column)?;
        let rows = self
            .rows
            .iter()
            .filter(|row| {
                row.get(col)
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .map(|v| filter.matches(v))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        Ok(Table {
            headers: self.headers.clone(),
            rows,
        })
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, TableError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.into_inner().map_err(|e| TableError::Read(e.to_string()))
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

/// A single numeric threshold on one column
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: Comparison,
    pub threshold: f64,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: Comparison, threshold: f64) -> Self {
        Self {
            column: column.into(),
            op,
            threshold,
        }
    }

    /// Parse `<column> <op> <number>`; two-character operators win over one-character ones
    pub fn parse(expr: &str) -> Result<Self, TableError> {
        let invalid = || TableError::InvalidFilter(expr.to_string());
        let ops = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ];

        let (idx, symbol, op) = ops
            .iter()
            .filter_map(|(sym, op)| expr.find(sym).map(|idx| (idx, *sym, *op)))
            .min_by_key(|(idx, sym, _)| (*idx, std::cmp::Reverse(sym.len())))
            .ok_or_else(invalid)?;

        let column = expr[..idx].trim();
        let value = expr[idx + symbol.len()..].trim();
        if column.is_empty() {
            return Err(invalid());
        }
        let threshold = value.parse::<f64>().map_err(|_| invalid())?;

        Ok(Self::new(column, op, threshold))
    }

    pub fn matches(&self, value: f64) -> bool {
        match self.op {
            Comparison::Lt => value < self.threshold,
            Comparison::Le => value <= self.threshold,
            Comparison::Gt => value > self.threshold,
            Comparison::Ge => value >= self.threshold,
            Comparison::Eq => (value - self.threshold).abs() < f64::EPSILON,
            Comparison::Ne => (value - self.threshold).abs() >= f64::EPSILON,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op.symbol(), self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETMHCPAN_CSV: &str = "MHC,Peptide,Aff(nM),%Rank_EL\n\
        HLA-A02:01,GADGVGKSA,35.2,0.41\n\
        HLA-A02:01,VVGADGVGK,4120.0,7.9\n\
        HLA-A02:01,KLVVVGADG,n/a,1.0\n";

    #[test]
    fn test_parse_csv_and_lookup() {
        let table = Table::parse(NETMHCPAN_CSV.as_bytes(), TableFormat::Csv).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.column("%Rank_EL"), Some(3));
        assert_eq!(table.column("peptide"), Some(1));
        assert_eq!(table.numeric(0, 2), Some(35.2));
        assert_eq!(table.numeric(2, 2), None);
    }

    #[test]
    fn test_parse_tsv_skips_blank_rows() {
        let tsv = "Peptide\tTAP\nGADGVGKSA\t1.2\n\t\nVVGADGVGK\t-0.3\n";
        let table = Table::parse(tsv.as_bytes(), TableFormat::Tsv).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, 0), Some("VVGADGVGK"));
    }

    #[test]
    fn test_filter_parse() {
        let f = Filter::parse("%Rank_EL <= 2").unwrap();
        assert_eq!(f.column, "%Rank_EL");
        assert_eq!(f.op, Comparison::Le);
        assert_eq!(f.threshold, 2.0);

        let f = Filter::parse("Aff(nM)<500").unwrap();
        assert_eq!(f.column, "Aff(nM)");
        assert_eq!(f.op, Comparison::Lt);

        let f = Filter::parse("score >= 0.5").unwrap();
        assert_eq!(f.op, Comparison::Ge);
        assert_eq!(f.to_string(), "score >= 0.5");

        assert!(Filter::parse("score").is_err());
        assert!(Filter::parse("<= 2").is_err());
        assert!(Filter::parse("score >= high").is_err());
    }

    #[test]
    fn test_filter_drops_non_numeric_rows() {
        let table = Table::parse(NETMHCPAN_CSV.as_bytes(), TableFormat::Csv).unwrap();
        let kept = table.filter(&Filter::parse("Aff(nM) < 500").unwrap()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.cell(0, 1), Some("GADGVGKSA"));

        let err = table.filter(&Filter::parse("BigMHC_IM >= 0.5").unwrap()).unwrap_err();
        assert!(matches!(err, TableError::MissingColumn(c) if c == "BigMHC_IM"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(TableFormat::from_path("run/step3.XLSX"), TableFormat::Xlsx);
        assert_eq!(TableFormat::from_path("netchop.tsv"), TableFormat::Tsv);
        assert_eq!(TableFormat::from_path("bigmhc.csv"), TableFormat::Csv);
        assert_eq!(TableFormat::from_path("noext"), TableFormat::Csv);
    }

    #[test]
    fn test_to_csv_round_trips_filtered_rows() {
        let table = Table::parse(NETMHCPAN_CSV.as_bytes(), TableFormat::Csv).unwrap();
        let kept = table.filter(&Filter::parse("%Rank_EL <= 2").unwrap()).unwrap();
        let csv = String::from_utf8(kept.to_csv().unwrap()).unwrap();
        assert!(csv.starts_with("MHC,Peptide,Aff(nM),%Rank_EL\n"));
        assert!(csv.contains("GADGVGKSA"));
        assert!(csv.contains("KLVVVGADG"));
        assert!(!csv.contains("VVGADGVGK,"));
    }
}
