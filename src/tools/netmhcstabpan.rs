// NetMHCstabpan: peptide-MHC complex stability

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::netmhcpan::parse_allele_list;
use super::{parse_args, ServiceClient, Tool, ToolError, ToolOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetMhcStabPanRequest {
    pub input_file: String,
    pub hla: String,
}

pub struct NetMhcStabPan {
    client: ServiceClient,
}

impl NetMhcStabPan {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for NetMhcStabPan {
    fn name(&self) -> &'static str {
        "netmhcstabpan"
    }

    fn description(&self) -> &'static str {
        "Predict the stability (half-life) of peptide-HLA class I complexes. Returns a link to a table with MHC, Peptide, Thalf(h) and %Rank_Stab."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input_file": {"type": "string", "description": "minio:// URL of the peptide FASTA file"},
                "hla": {"type": "string", "description": "Comma separated HLA alleles"}
            },
            "required": ["input_file", "hla"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let mut request: NetMhcStabPanRequest = parse_args(self.name(), args)?;
        let alleles = parse_allele_list(&request.hla);
        if alleles.is_empty() {
            return Err(ToolError::Arguments {
                tool: self.name().to_string(),
                message: format!("no HLA allele recognised in '{}'", request.hla),
            });
        }
        request.hla = alleles.join(",");
        self.client.post(self.name(), &request).await
    }
}
