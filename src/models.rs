use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::agents::{Agent, AgentRequest, PatientFiles};
use crate::config::Config;
use crate::pipeline::StepPlan;
use crate::storage::{ObjectUrl, Storage, StorageError};
use crate::tools::netmhcpan::normalize_allele;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub agent: Arc<Agent>,
    pub storage: Storage,
}

impl AppState {
    pub fn new(config: Config, agent: Agent) -> Self {
        let storage = agent.storage().clone();
        Self {
            config: Arc::new(config),
            agent: Arc::new(agent),
            storage,
        }
    }
}

// API Request/Response types

/// Files attached to a turn, as object-store URLs or keys
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct FilesPayload {
    pub mutation_file: Option<String>,
    pub hla_file: Option<String>,
    pub cdr3_file: Option<String>,
    /// HLA alleles typed in a form rather than uploaded
    #[serde(default)]
    pub hla: Vec<String>,
}

impl FilesPayload {
    pub fn into_patient_files(self, storage: &Storage) -> Result<PatientFiles, StorageError> {
        let parse = |raw: Option<String>| -> Result<Option<ObjectUrl>, StorageError> {
            match raw.as_deref().map(str::trim) {
                Some(raw) if !raw.is_empty() => storage.parse_url(raw).map(Some),
                _ => Ok(None),
            }
        };

        let mut files = PatientFiles {
            mutation_file: parse(self.mutation_file)?,
            hla_file: parse(self.hla_file)?,
            cdr3_file: parse(self.cdr3_file)?,
            ..Default::default()
        };
        files.add_alleles(self.hla.iter().filter_map(|a| normalize_allele(a)));
        Ok(files)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct StreamRequest {
    #[validate(length(min = 1, max = 20000, message = "message must not be empty"))]
    pub message: String,
    #[validate(length(max = 128))]
    pub thread_id: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub files: FilesPayload,
}

impl StreamRequest {
    pub fn into_agent_request(self, storage: &Storage) -> Result<AgentRequest, StorageError> {
        Ok(AgentRequest {
            message: self.message,
            thread_id: self.thread_id,
            files: self.files.into_patient_files(storage)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct DescriptionResponse {
    pub name: String,
    pub description: String,
    pub model: String,
    pub tools: Vec<ToolSummary>,
    pub pipeline: Vec<StepPlan>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub size: usize,
    pub content_type: String,
    pub download: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: String,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_request_validation() {
        let ok: StreamRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(ok.validate().is_ok());

        let empty: StreamRequest = serde_json::from_str(r#"{"message":""}"#).unwrap();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_files_payload_to_patient_files() {
        let storage = Storage::in_memory("neoagent");
        let payload: FilesPayload = serde_json::from_str(
            r#"{"mutation_file":"s3://neoagent/uploads/m.fasta","cdr3_file":" ","hla":["A*02:01","nonsense"]}"#,
        )
        .unwrap();

        let files = payload.into_patient_files(&storage).unwrap();
        assert_eq!(files.mutation_file, Some(ObjectUrl::new("neoagent", "uploads/m.fasta")));
        assert_eq!(files.cdr3_file, None);
        assert_eq!(files.hla_alleles, vec!["HLA-A02:01"]);
    }
}
