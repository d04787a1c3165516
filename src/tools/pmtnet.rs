//! pMTnet: TCR-pMHC interaction
//!
//! Input is a CSV with `CDR3,Antigen,HLA`; the result table adds `Rank`
//! (lower means a stronger predicted interaction).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{parse_args, ServiceClient, Tool, ToolError, ToolOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmtNetRequest {
    /// Object URL of a CSV with `CDR3`, `Antigen` and `HLA` columns
    pub input_file: String,
}

pub struct PmtNet {
    client: ServiceClient,
}

impl PmtNet {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    pub async fn predict(&self, request: &PmtNetRequest) -> Result<ToolOutput, ToolError> {
        self.client.post(self.name(), request).await
    }
}

#[async_trait]
impl Tool for PmtNet {
    fn name(&self) -> &'static str {
        "pmtnet"
    }

    fn description(&self) -> &'static str {
        "Predict TCR recognition of peptide-HLA complexes with pMTnet. Input is a CSV with CDR3, Antigen and HLA columns; returns a link to a table with a percentile Rank (lower is stronger)."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input_file": {"type": "string", "description": "minio:// URL of a CSV with CDR3,Antigen,HLA columns"}
            },
            "required": ["input_file"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let request: PmtNetRequest = parse_args(self.name(), args)?;
        self.predict(&request).await
    }
}
