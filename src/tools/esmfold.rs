// ESMFold structure prediction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{parse_args, ServiceClient, Tool, ToolError, ToolOutput};

const MAX_SEQUENCE_LEN: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsmFoldRequest {
    pub sequence: String,
}

pub struct EsmFold {
    client: ServiceClient,
}

impl EsmFold {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for EsmFold {
    fn name(&self) -> &'static str {
        "esmfold"
    }

    fn description(&self) -> &'static str {
        "Predict the 3D structure of a protein or peptide sequence with ESMFold. Returns a link to a PDB file."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sequence": {"type": "string", "description": "Amino acid sequence (one-letter codes)"}
            },
            "required": ["sequence"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let mut request: EsmFoldRequest = parse_args(self.name(), args)?;
        request.sequence = request
            .sequence
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        let record = crate::fasta::FastaRecord::new("query", request.sequence.clone());
        crate::fasta::validate_protein(&record).map_err(|e| ToolError::Arguments {
            tool: self.name().to_string(),
            message: e.to_string(),
        })?;
        if request.sequence.is_empty() || request.sequence.len() > MAX_SEQUENCE_LEN {
            return Err(ToolError::Arguments {
                tool: self.name().to_string(),
                message: format!("sequence length must be between 1 and {}", MAX_SEQUENCE_LEN),
            });
        }

        self.client.post(self.name(), &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_rejects_invalid_sequence_before_calling_service() {
        let tool = EsmFold::new(ServiceClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/esmfold",
            Duration::from_secs(1),
        ));
        let err = tool
            .call(serde_json::json!({"sequence": "MKT1LL"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Arguments { .. }));
    }
}
