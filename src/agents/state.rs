use serde::{Deserialize, Serialize};

use crate::pipeline::{PipelineInput, PipelineReport};
use crate::storage::ObjectUrl;
use crate::tools::ToolOutput;
use crate::types::{Language, LLMMessage};

/// Where the router sends a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Pipeline,
    Tool,
    Chat,
}

impl Route {
    /// Read the first route keyword from a model answer
    pub fn parse(answer: &str) -> Option<Self> {
        let lower = answer.to_lowercase();
        [("pipeline", Route::Pipeline), ("tool", Route::Tool), ("chat", Route::Chat)]
            .into_iter()
            .filter_map(|(word, route)| lower.find(word).map(|idx| (idx, route)))
            .min_by_key(|(idx, _)| *idx)
            .map(|(_, route)| route)
    }
}

/// Patient inputs collected over the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientFiles {
    pub mutation_file: Option<ObjectUrl>,
    pub hla_file: Option<ObjectUrl>,
    pub hla_alleles: Vec<String>,
    pub cdr3_file: Option<ObjectUrl>,
}

impl PatientFiles {
    /// Newer values win; alleles accumulate
    pub fn merge(&mut self, other: PatientFiles) {
        if other.mutation_file.is_some() {
            self.mutation_file = other.mutation_file;
        }
        if other.hla_file.is_some() {
            self.hla_file = other.hla_file;
        }
        if other.cdr3_file.is_some() {
            self.cdr3_file = other.cdr3_file;
        }
        self.add_alleles(other.hla_alleles);
    }

    pub fn add_alleles(&mut self, alleles: impl IntoIterator<Item = String>) {
        for allele in alleles {
            if !self.hla_alleles.contains(&allele) {
                self.hla_alleles.push(allele);
            }
        }
    }

    /// Names of the inputs the pipeline still needs
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.mutation_file.is_none() {
            missing.push("mutation_file");
        }
        if self.hla_alleles.is_empty() {
            missing.push("hla");
        }
        missing
    }

    pub fn to_pipeline_input(&self) -> Option<PipelineInput> {
        if self.hla_alleles.is_empty() {
            return None;
        }
        Some(PipelineInput {
            mutation_file: self.mutation_file.clone()?,
            hla_alleles: self.hla_alleles.clone(),
            cdr3_file: self.cdr3_file.clone(),
        })
    }

    /// Summary handed to the model so it can pass file URLs to tools
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        if let Some(url) = &self.mutation_file {
            lines.push(format!("Mutation FASTA: {}", url));
        }
        if let Some(url) = &self.hla_file {
            lines.push(format!("HLA typing file: {}", url));
        }
        if !self.hla_alleles.is_empty() {
            lines.push(format!("HLA alleles: {}", self.hla_alleles.join(",")));
        }
        if let Some(url) = &self.cdr3_file {
            lines.push(format!("CDR3 file: {}", url));
        }
        if lines.is_empty() {
            "No patient files uploaded yet.".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Everything the graph reads and writes for one conversation thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub thread_id: String,
    pub messages: Vec<LLMMessage>,
    pub files: PatientFiles,
    pub route: Option<Route>,
    pub pipeline: Option<PipelineReport>,
    pub draft_answer: Option<String>,
    pub report_links: Vec<ToolOutput>,
    pub language: Language,
}

impl AgentState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            files: PatientFiles::default(),
            route: None,
            pipeline: None,
            draft_answer: None,
            report_links: Vec::new(),
            language: Language::En,
        }
    }

    /// Reset per-turn fields and record the new user message
    pub fn begin_turn(&mut self, message: &str, files: PatientFiles) {
        self.route = None;
        self.pipeline = None;
        self.draft_answer = None;
        self.report_links.clear();
        self.language = Language::detect(message);
        self.files.merge(files);
        self.messages.push(LLMMessage::user(message));
    }

    pub fn last_user_message(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}
