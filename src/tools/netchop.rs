//! NetChop: proteasomal cleavage prediction
//!
//! Result table columns: `pos`, `AA`, `C`, `score`, `Ident`; one row per
//! residue, `C` is `S` where a cleavage site is predicted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{parse_args, ServiceClient, Tool, ToolError, ToolOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetChopRequest {
    /// Object URL of the protein FASTA
    pub input_file: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

pub struct NetChop {
    client: ServiceClient,
}

impl NetChop {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    pub async fn predict(&self, request: &NetChopRequest) -> Result<ToolOutput, ToolError> {
        self.client.post(self.name(), request).await
    }
}

#[async_trait]
impl Tool for NetChop {
    fn name(&self) -> &'static str {
        "netchop"
    }

    fn description(&self) -> &'static str {
        "Predict proteasomal cleavage sites (NetChop 3.1) for protein sequences in a FASTA file. Returns a link to a per-residue score table."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input_file": {"type": "string", "description": "minio:// URL of the protein FASTA file"},
                "threshold": {"type": "number", "description": "Cleavage score threshold, default 0.5"}
            },
            "required": ["input_file"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let request: NetChopRequest = parse_args(self.name(), args)?;
        self.predict(&request).await
    }
}
