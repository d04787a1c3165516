//! NetMHCpan 4.1: peptide-MHC class I binding
//!
//! Result table columns: `MHC`, `Peptide`, `Aff(nM)`, `%Rank_EL`.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{parse_args, ServiceClient, Tool, ToolError, ToolOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetMhcPanRequest {
    /// Object URL of the peptide FASTA
    pub input_file: String,
    /// Comma separated alleles in NetMHCpan form, e.g. "HLA-A02:01,HLA-B07:02"
    pub hla: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peptide_length: Option<String>,
}

fn allele_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:HLA-?)?([ABC])\*?(\d{2,3}):?(\d{2,3})\b").expect("valid allele regex")
    })
}

/// Normalize `HLA-A*02:01`, `A*02:01`, `A0201` and similar to `HLA-A02:01`
pub fn normalize_allele(raw: &str) -> Option<String> {
    let caps = allele_regex().captures(raw.trim())?;
    Some(format!(
        "HLA-{}{}:{}",
        caps[1].to_uppercase(),
        &caps[2],
        &caps[3]
    ))
}

/// Every HLA class I allele mentioned in free text, normalized and de-duplicated
///
/// Prose needs an `HLA-` prefix or a `*`/`:` separator before a token counts
/// as an allele, so words like "c1234" are left alone.
pub fn extract_alleles(text: &str) -> Vec<String> {
    let mut alleles: Vec<String> = Vec::new();
    for m in allele_regex().find_iter(text) {
        let token = m.as_str();
        let marked = token.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("hla")) || token.contains(['*', ':']);
        if !marked {
            continue;
        }
        if let Some(allele) = normalize_allele(token) {
            if !alleles.contains(&allele) {
                alleles.push(allele);
            }
        }
    }
    alleles
}

/// Alleles from an explicit list such as `A0201, HLA-B*07:02`
///
/// Unlike [`extract_alleles`] every entry is read as an allele, bare forms included.
pub fn parse_allele_list(raw: &str) -> Vec<String> {
    let mut alleles: Vec<String> = Vec::new();
    for entry in raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        if let Some(allele) = normalize_allele(entry) {
            if !alleles.contains(&allele) {
                alleles.push(allele);
            }
        }
    }
    alleles
}

pub struct NetMhcPan {
    client: ServiceClient,
}

impl NetMhcPan {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    pub async fn predict(&self, request: &NetMhcPanRequest) -> Result<ToolOutput, ToolError> {
        self.client.post(self.name(), request).await
    }
}

#[async_trait]
impl Tool for NetMhcPan {
    fn name(&self) -> &'static str {
        "netmhcpan"
    }

    fn description(&self) -> &'static str {
        "Predict peptide binding to HLA class I alleles (NetMHCpan 4.1). Returns a link to a table with MHC, Peptide, Aff(nM) and %Rank_EL; %Rank_EL below 2 is a binder, below 0.5 a strong binder."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input_file": {"type": "string", "description": "minio:// URL of the peptide FASTA file"},
                "hla": {"type": "string", "description": "Comma separated HLA alleles, e.g. HLA-A02:01,HLA-B07:02"},
                "peptide_length": {"type": "string", "description": "Comma separated peptide lengths"}
            },
            "required": ["input_file", "hla"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let mut request: NetMhcPanRequest = parse_args(self.name(), args)?;
        let alleles = parse_allele_list(&request.hla);
        if alleles.is_empty() {
            return Err(ToolError::Arguments {
                tool: self.name().to_string(),
                message: format!("no HLA allele recognised in '{}'", request.hla),
            });
        }
        request.hla = alleles.join(",");
        self.predict(&request).await
    }
}
