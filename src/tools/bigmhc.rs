//! BigMHC-IM: immunogenicity of presented peptides
//!
//! Input is a CSV with `mhc,pep` columns; the result table adds `BigMHC_IM`
//! (probability of an immunogenic response).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{parse_args, ServiceClient, Tool, ToolError, ToolOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigMhcRequest {
    /// Object URL of a CSV with `mhc` and `pep` columns
    pub input_file: String,
}

pub struct BigMhcIm {
    client: ServiceClient,
}

impl BigMhcIm {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    pub async fn predict(&self, request: &BigMhcRequest) -> Result<ToolOutput, ToolError> {
        self.client.post(self.name(), request).await
    }
}

#[async_trait]
impl Tool for BigMhcIm {
    fn name(&self) -> &'static str {
        "bigmhc_im"
    }

    fn description(&self) -> &'static str {
        "Predict immunogenicity of peptide-HLA pairs with BigMHC-IM. Input is a CSV with mhc and pep columns; returns a link to a table with a BigMHC_IM score between 0 and 1."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input_file": {"type": "string", "description": "minio:// URL of a CSV with mhc,pep columns"}
            },
            "required": ["input_file"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let request: BigMhcRequest = parse_args(self.name(), args)?;
        self.predict(&request).await
    }
}
