// TAP transport efficiency (NetCTLpan TAP module)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{parse_args, ServiceClient, Tool, ToolError, ToolOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetTapRequest {
    /// Object URL of the peptide FASTA
    pub input_file: String,
    /// Comma separated peptide lengths, e.g. "8,9,10,11"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peptide_length: Option<String>,
}

pub struct NetTap {
    client: ServiceClient,
}

impl NetTap {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    pub async fn predict(&self, request: &NetTapRequest) -> Result<ToolOutput, ToolError> {
        self.client.post(self.name(), request).await
    }
}

#[async_trait]
impl Tool for NetTap {
    fn name(&self) -> &'static str {
        "nettap"
    }

    fn description(&self) -> &'static str {
        "Predict TAP transport efficiency for peptides in a FASTA file. Returns a link to a table with columns Peptide and TAP."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input_file": {"type": "string", "description": "minio:// URL of the peptide FASTA file"},
                "peptide_length": {"type": "string", "description": "Comma separated peptide lengths, e.g. 8,9,10,11"}
            },
            "required": ["input_file"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let request: NetTapRequest = parse_args(self.name(), args)?;
        self.predict(&request).await
    }
}
