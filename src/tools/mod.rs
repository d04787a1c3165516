//! Prediction Tool Wrappers
//!
//! One adapter per external bioinformatics service. HTTP services receive a
//! JSON body and answer with the [`ToolOutput`] envelope; local programs are
//! driven through [`command::CommandRunner`].
//!
//! | Tool | Backend | Predicts |
//! |------|---------|----------|
//! | `netchop` | HTTP | proteasomal cleavage sites |
//! | `nettap` | HTTP | TAP transport efficiency |
//! | `netmhcpan` | HTTP | peptide-MHC binding (%Rank_EL) |
//! | `netmhcstabpan` | HTTP | peptide-MHC complex stability |
//! | `bigmhc_im` | HTTP | immunogenicity |
//! | `pmtnet` | HTTP | TCR-pMHC interaction |
//! | `esmfold` | HTTP | protein structure |
//! | `rnafold` | subprocess | RNA secondary structure / MFE |
//! | `lineardesign` | subprocess | codon-optimized mRNA |

pub mod bigmhc;
pub mod command;
pub mod esmfold;
pub mod http;
pub mod lineardesign;
pub mod netchop;
pub mod netmhcpan;
pub mod netmhcstabpan;
pub mod nettap;
pub mod pmtnet;
pub mod rnafold;

pub use bigmhc::BigMhcIm;
pub use command::CommandRunner;
pub use esmfold::EsmFold;
pub use http::ServiceClient;
pub use lineardesign::{LinearDesign, MrnaDesign};
pub use netchop::NetChop;
pub use netmhcpan::NetMhcPan;
pub use netmhcstabpan::NetMhcStabPan;
pub use nettap::NetTap;
pub use pmtnet::PmtNet;
pub use rnafold::{RnaFold, RnaStructure};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ServicesConfig;
use crate::types::ToolDefinition;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool}: request failed: {message}")]
    Request { tool: String, message: String },

    #[error("{tool}: service returned HTTP {status}: {body}")]
    Status { tool: String, status: u16, body: String },

    #[error("{tool}: timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("{tool}: command failed: {message}")]
    Command { tool: String, message: String },

    #[error("{tool}: unexpected output: {message}")]
    Output { tool: String, message: String },

    #[error("{tool}: invalid arguments: {message}")]
    Arguments { tool: String, message: String },
}

/// Envelope exchanged with every service and returned to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    Text { content: String },
    Link { url: String, content: String },
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        ToolOutput::Text { content: content.into() }
    }

    pub fn link(url: impl Into<String>, content: impl Into<String>) -> Self {
        ToolOutput::Link {
            url: url.into(),
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ToolOutput::Text { content } | ToolOutput::Link { content, .. } => content,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ToolOutput::Link { url, .. } => Some(url),
            ToolOutput::Text { .. } => None,
        }
    }

    /// The result-table URL a pipeline step needs; a text answer means the service failed
    pub fn require_url(&self, tool: &str) -> Result<&str, ToolError> {
        self.url().ok_or_else(|| ToolError::Output {
            tool: tool.to_string(),
            message: self.content().to_string(),
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.content().to_string())
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> serde_json::Value;

    async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Decode tool arguments into the typed request of a wrapper
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::Arguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Typed handles on every service, shared by the pipeline and the registry
#[derive(Clone)]
pub struct Services {
    pub netchop: Arc<NetChop>,
    pub nettap: Arc<NetTap>,
    pub netmhcpan: Arc<NetMhcPan>,
    pub netmhcstabpan: Arc<NetMhcStabPan>,
    pub bigmhc: Arc<BigMhcIm>,
    pub pmtnet: Arc<PmtNet>,
    pub esmfold: Arc<EsmFold>,
    pub rnafold: Arc<RnaFold>,
    pub lineardesign: Arc<LinearDesign>,
}

impl Services {
    pub fn from_config(config: &ServicesConfig) -> Self {
        let http = reqwest::Client::new();
        let timeout = config.timeout();
        let client = |url: &str| ServiceClient::new(http.clone(), url, timeout);

        Self {
            netchop: Arc::new(NetChop::new(client(&config.netchop_url))),
            nettap: Arc::new(NetTap::new(client(&config.nettap_url))),
            netmhcpan: Arc::new(NetMhcPan::new(client(&config.netmhcpan_url))),
            netmhcstabpan: Arc::new(NetMhcStabPan::new(client(&config.netmhcstabpan_url))),
            bigmhc: Arc::new(BigMhcIm::new(client(&config.bigmhc_url))),
            pmtnet: Arc::new(PmtNet::new(client(&config.pmtnet_url))),
            esmfold: Arc::new(EsmFold::new(client(&config.esmfold_url))),
            rnafold: Arc::new(RnaFold::new(CommandRunner::from_argv("rnafold", &config.rnafold_cmd, timeout))),
            lineardesign: Arc::new(LinearDesign::new(CommandRunner::from_argv(
                "lineardesign",
                &config.lineardesign_cmd,
                timeout,
            ))),
        }
    }
}

/// Tools the model may call, keyed by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_services(services: &Services) -> Self {
        let mut registry = Self::new();
        registry.register(services.netchop.clone());
        registry.register(services.nettap.clone());
        registry.register(services.netmhcpan.clone());
        registry.register(services.netmhcstabpan.clone());
        registry.register(services.bigmhc.clone());
        registry.register(services.pmtnet.clone());
        registry.register(services.esmfold.clone());
        registry.register(services.rnafold.clone());
        registry.register(services.lineardesign.clone());
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Run a tool; every failure comes back as a text envelope
    pub async fn invoke(&self, name: &str, args: serde_json::Value) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "Model requested unknown tool");
            return ToolOutput::text(format!("Unknown tool: {}", name));
        };

        info!(tool = %name, "Invoking tool");
        match tool.call(args).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool call failed");
                ToolOutput::text(e.to_string())
            }
        }
    }
}
