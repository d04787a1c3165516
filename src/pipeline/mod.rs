//! Neoantigen Selection Pipeline
//!
//! ```text
//! mutation FASTA
//!      │
//!      ▼
//!  step 1  cleavage (NetChop)          → candidate peptides FASTA
//!  step 2  TAP transport               → transported peptides FASTA
//!  step 3  MHC binding (NetMHCpan)     → peptide/HLA pairs CSV
//!  step 4  immunogenicity (BigMHC-IM)  → immunogenic pairs CSV
//!  step 5  TCR interaction (pMTnet)    → recognised pairs CSV (skipped without CDR3 data)
//!  step 6  mRNA design (LinearDesign + RNAfold)
//! ```
//!
//! Steps run strictly in order. Every step uploads what it keeps under
//! `neoagent/<run_id>/` and the next step reads it back from there. The run
//! stops after the first step that keeps no candidate.

pub mod step1_cleavage;
pub mod step2_tap;
pub mod step3_affinity;
pub mod step4_immunogenicity;
pub mod step5_tcr;
pub mod step6_mrna;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::fasta::FastaError;
use crate::storage::{ObjectUrl, Storage, StorageError};
use crate::table::{Table, TableError, TableFormat};
use crate::tools::{MrnaDesign, RnaStructure, Services, ToolError, ToolOutput};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Fasta(#[from] FastaError),

    #[error("Step {step} ({name}) failed: {message}")]
    Step { step: u8, name: String, message: String },
}

/// Patient inputs for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    pub mutation_file: ObjectUrl,
    /// NetMHCpan form, e.g. `HLA-A02:01`
    pub hla_alleles: Vec<String>,
    pub cdr3_file: Option<ObjectUrl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub label: String,
    pub url: ObjectUrl,
    pub download: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: u8,
    pub name: String,
    pub tool: String,
    /// Threshold expression applied, e.g. `%Rank_EL <= 2`
    pub criterion: String,
    pub input_count: usize,
    pub passed_count: usize,
    pub status: StepStatus,
    pub artifacts: Vec<Artifact>,
    pub message: String,
}

impl StepOutcome {
    fn new(step: u8, name: &str, tool: &str, criterion: String, input_count: usize, passed_count: usize) -> Self {
        Self {
            step,
            name: name.to_string(),
            tool: tool.to_string(),
            criterion,
            input_count,
            passed_count,
            status: if passed_count == 0 { StepStatus::Empty } else { StepStatus::Completed },
            artifacts: Vec::new(),
            message: String::new(),
        }
    }

    fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// A peptide cut out of a mutated protein
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peptide {
    pub sequence: String,
    pub source: String,
    /// 1-based position of the first residue in the source protein
    pub start: usize,
}

impl Peptide {
    pub fn end(&self) -> usize {
        self.start + self.sequence.len() - 1
    }

    pub fn fasta_id(&self) -> String {
        format!("{}|{}-{}", self.source, self.start, self.end())
    }
}

/// A peptide/HLA pair that survived MHC binding and the later filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub peptide: String,
    pub allele: String,
    pub source: String,
    pub affinity_nm: Option<f64>,
    pub rank_el: f64,
    pub immunogenicity: Option<f64>,
    pub tcr_rank: Option<f64>,
    pub cdr3: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MrnaResult {
    pub epitopes: Vec<String>,
    /// Polyepitope protein fed to LinearDesign
    pub construct: String,
    pub design: MrnaDesign,
    pub structure: RnaStructure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineStatus {
    Completed,
    NoCandidates { step: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub input: PipelineInput,
    pub steps: Vec<StepOutcome>,
    pub candidates: Vec<Candidate>,
    pub mrna: Option<MrnaResult>,
    pub status: PipelineStatus,
}

/// Receives each step outcome as soon as the step finishes
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn on_step(&self, outcome: &StepOutcome);
}

#[async_trait]
impl StepObserver for () {
    async fn on_step(&self, _outcome: &StepOutcome) {}
}

#[derive(Clone)]
pub struct PipelineContext {
    pub storage: Storage,
    pub services: Services,
    pub thresholds: PipelineConfig,
}

impl PipelineContext {
    pub fn new(storage: Storage, services: Services, thresholds: PipelineConfig) -> Self {
        Self {
            storage,
            services,
            thresholds,
        }
    }

    pub(crate) async fn upload_artifact(
        &self,
        run_id: &str,
        file_name: &str,
        label: &str,
        data: Vec<u8>,
    ) -> Result<Artifact, PipelineError> {
        let key = format!("neoagent/{}/{}", run_id, file_name);
        let url = self.storage.put(&key, data).await?;
        Ok(Artifact {
            label: label.to_string(),
            download: self.storage.download_link(&url),
            url,
        })
    }

    /// Download the result table a service linked to
    pub(crate) async fn fetch_table(&self, output: &ToolOutput, tool: &str) -> Result<Table, PipelineError> {
        let url = self.storage.parse_url(output.require_url(tool)?)?;
        let bytes = self.storage.download(&url).await?;
        Ok(Table::parse(&bytes, TableFormat::from_path(&url.key))?)
    }

    pub(crate) fn peptide_lengths_arg(&self) -> String {
        self.thresholds
            .peptide_lengths
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The six steps with the thresholds currently in force
    pub fn plan(&self) -> Vec<StepPlan> {
        let t = &self.thresholds;
        let step = |step: u8, name: &str, tool: &str, criterion: String| StepPlan {
            step,
            name: name.to_string(),
            tool: tool.to_string(),
            criterion,
        };
        vec![
            step(1, step1_cleavage::NAME, "netchop", format!("score >= {}", t.cleavage_score_min)),
            step(2, step2_tap::NAME, "nettap", format!("TAP >= {}", t.tap_score_min)),
            step(3, step3_affinity::NAME, "netmhcpan", format!("%Rank_EL <= {}", t.affinity_rank_max)),
            step(4, step4_immunogenicity::NAME, "bigmhc_im", format!("BigMHC_IM >= {}", t.immunogenicity_min)),
            step(5, step5_tcr::NAME, "pmtnet", format!("Rank <= {}", t.tcr_rank_max)),
            step(6, step6_mrna::NAME, "lineardesign", format!("linker {}", t.epitope_linker)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepPlan {
    pub step: u8,
    pub name: String,
    pub tool: String,
    pub criterion: String,
}

fn step_error(step: u8, name: &str, e: PipelineError) -> PipelineError {
    error!(step, name = %name, error = %e, "Pipeline step failed");
    match e {
        PipelineError::MissingInput(_) | PipelineError::Step { .. } => e,
        other => PipelineError::Step {
            step,
            name: name.to_string(),
            message: other.to_string(),
        },
    }
}

/// Run steps 1 to 6, stopping at the first step that keeps nothing
pub async fn run(
    ctx: &PipelineContext,
    input: PipelineInput,
    observer: &dyn StepObserver,
) -> Result<PipelineReport, PipelineError> {
    if input.hla_alleles.is_empty() {
        return Err(PipelineError::MissingInput("HLA typing".to_string()));
    }

    let run_id = uuid::Uuid::new_v4().simple().to_string();
    info!(run_id = %run_id, alleles = ?input.hla_alleles, "Starting neoantigen pipeline");

    let mut report = PipelineReport {
        run_id: run_id.clone(),
        input: input.clone(),
        steps: Vec::new(),
        candidates: Vec::new(),
        mrna: None,
        status: PipelineStatus::Completed,
    };

    macro_rules! finish_step {
        ($outcome:expr) => {{
            let outcome = $outcome;
            info!(
                step = outcome.step,
                name = %outcome.name,
                input = outcome.input_count,
                passed = outcome.passed_count,
                "Pipeline step finished"
            );
            observer.on_step(&outcome).await;
            let empty = outcome.status == StepStatus::Empty;
            let step = outcome.step;
            report.steps.push(outcome);
            if empty {
                warn!(run_id = %run_id, step, "No candidates left, stopping pipeline");
                report.status = PipelineStatus::NoCandidates { step };
                return Ok(report);
            }
        }};
    }

    let (outcome, cleaved) = step1_cleavage::run(ctx, &run_id, &input.mutation_file)
        .await
        .map_err(|e| step_error(1, step1_cleavage::NAME, e))?;
    finish_step!(outcome);

    let (outcome, transported) = step2_tap::run(ctx, &run_id, &cleaved)
        .await
        .map_err(|e| step_error(2, step2_tap::NAME, e))?;
    finish_step!(outcome);

    let (outcome, binders) = step3_affinity::run(ctx, &run_id, &transported, &input.hla_alleles)
        .await
        .map_err(|e| step_error(3, step3_affinity::NAME, e))?;
    report.candidates = binders.candidates.clone();
    finish_step!(outcome);

    let (outcome, immunogenic) = step4_immunogenicity::run(ctx, &run_id, &binders)
        .await
        .map_err(|e| step_error(4, step4_immunogenicity::NAME, e))?;
    report.candidates = immunogenic.clone();
    finish_step!(outcome);

    let (outcome, recognised) = step5_tcr::run(ctx, &run_id, immunogenic, input.cdr3_file.as_ref())
        .await
        .map_err(|e| step_error(5, step5_tcr::NAME, e))?;
    report.candidates = recognised.clone();
    finish_step!(outcome);

    let (outcome, mrna) = step6_mrna::run(ctx, &run_id, &recognised)
        .await
        .map_err(|e| step_error(6, step6_mrna::NAME, e))?;
    report.mrna = Some(mrna);
    finish_step!(outcome);

    info!(run_id = %run_id, candidates = report.candidates.len(), "Neoantigen pipeline completed");
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ServicesConfig;
    use std::sync::Mutex;

    pub(crate) const MUTATIONS: &str = ">KRAS_G12D mut_pos=12\nMTEYKLVVVGADGVGKSALT\n";

    const NETCHOP: &str = "pos,AA,C,score,Ident\n\
        13,G,.,0.20,KRAS_G12D\n\
        16,K,S,0.91,KRAS_G12D\n\
        18,A,S,0.80,OTHER\n\
        20,T,S,0.70,KRAS_G12D\n";
    const NETTAP: &str = "Peptide,TAP\nVVGADGVGK,1.2\nDGVGKSALT,0.1\n";
    const NETMHCPAN: &str = "MHC,Peptide,Aff(nM),%Rank_EL\n\
        HLA-A11:01,VVGADGVGK,45.3,0.35\n\
        HLA-A02:01,VVGADGVGK,8000,12.5\n";
    const BIGMHC: &str = "mhc,pep,BigMHC_IM\nHLA-A*11:01,VVGADGVGK,0.81\n";
    const PMTNET: &str = "CDR3,Antigen,HLA,Rank\n\
        CASSLGQAYEQYF,VVGADGVGK,A*11:01,0.35\n\
        CASSIRSSYEQYF,VVGADGVGK,A*11:01,0.02\n";

    pub(crate) struct Fixture {
        pub server: mockito::ServerGuard,
        pub ctx: PipelineContext,
        pub input: PipelineInput,
    }

    fn link(key: &str) -> String {
        format!(r#"{{"type":"link","url":"minio://neoagent/{}","content":"done"}}"#, key)
    }

    pub(crate) async fn fixture(nettap_table: &str) -> Fixture {
        let server = mockito::Server::new_async().await;
        let storage = Storage::in_memory("neoagent");

        for (key, body) in [
            ("results/netchop.csv", NETCHOP),
            ("results/nettap.csv", nettap_table),
            ("results/netmhcpan.csv", NETMHCPAN),
            ("results/bigmhc.csv", BIGMHC),
            ("results/pmtnet.csv", PMTNET),
        ] {
            storage.put(key, body.as_bytes().to_vec()).await.unwrap();
        }
        let mutation_file = storage.put("uploads/mutations.fasta", MUTATIONS.as_bytes().to_vec()).await.unwrap();
        let cdr3_file = storage
            .put("uploads/cdr3.txt", b"CASSLGQAYEQYF\nCASSIRSSYEQYF\n".to_vec())
            .await
            .unwrap();

        let url = server.url();
        let services = Services::from_config(&ServicesConfig {
            netchop_url: format!("{}/netchop", url),
            nettap_url: format!("{}/nettap", url),
            netmhcpan_url: format!("{}/netmhcpan", url),
            netmhcstabpan_url: format!("{}/netmhcstabpan", url),
            bigmhc_url: format!("{}/bigmhc", url),
            pmtnet_url: format!("{}/pmtnet", url),
            esmfold_url: format!("{}/esmfold", url),
            rnafold_cmd: vec![
                "sh".to_string(),
                "-c".to_string(),
                "read seq; echo \"$seq\"; echo '......... ( -2.10)'".to_string(),
            ],
            lineardesign_cmd: vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat >/dev/null; printf 'mRNA sequence:  AUGGUUGUU\\nmRNA structure: .........\\nmRNA folding free energy: -12.50 kcal/mol; mRNA CAI: 0.812\\n'".to_string(),
            ],
            timeout_secs: 10,
        });

        let thresholds = PipelineConfig {
            peptide_lengths: vec![9],
            ..PipelineConfig::default()
        };

        Fixture {
            server,
            ctx: PipelineContext::new(storage, services, thresholds),
            input: PipelineInput {
                mutation_file,
                hla_alleles: vec!["HLA-A11:01".to_string(), "HLA-A02:01".to_string()],
                cdr3_file: Some(cdr3_file),
            },
        }
    }

    pub(crate) async fn mock_service(server: &mut mockito::ServerGuard, path: &str, key: &str) -> mockito::Mock {
        server
            .mock("POST", path)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(link(key))
            .create_async()
            .await
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(u8, usize, usize)>>,
    }

    #[async_trait]
    impl StepObserver for Recorder {
        async fn on_step(&self, outcome: &StepOutcome) {
            self.seen
                .lock()
                .unwrap()
                .push((outcome.step, outcome.input_count, outcome.passed_count));
        }
    }

    #[tokio::test]
    async fn test_full_run_tracks_counts_per_step() {
        let mut fx = fixture(NETTAP).await;
        let netchop = mock_service(&mut fx.server, "/netchop", "results/netchop.csv").await;
        let nettap = mock_service(&mut fx.server, "/nettap", "results/nettap.csv").await;
        let netmhcpan = fx
            .server
            .mock("POST", "/netmhcpan")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"hla": "HLA-A11:01,HLA-A02:01"})))
            .with_status(200)
            .with_body(link("results/netmhcpan.csv"))
            .create_async()
            .await;
        let bigmhc = mock_service(&mut fx.server, "/bigmhc", "results/bigmhc.csv").await;
        let pmtnet = mock_service(&mut fx.server, "/pmtnet", "results/pmtnet.csv").await;

        let recorder = Recorder::default();
        let report = run(&fx.ctx, fx.input.clone(), &recorder).await.unwrap();

        for mock in [netchop, nettap, netmhcpan, bigmhc, pmtnet] {
            mock.assert_async().await;
        }

        assert_eq!(report.status, PipelineStatus::Completed);
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![(1, 9, 2), (2, 2, 1), (3, 2, 1), (4, 1, 1), (5, 1, 1), (6, 1, 1)]
        );

        let candidate = &report.candidates[0];
        assert_eq!(candidate.peptide, "VVGADGVGK");
        assert_eq!(candidate.allele, "HLA-A11:01");
        assert_eq!(candidate.source, "KRAS_G12D");
        assert_eq!(candidate.affinity_nm, Some(45.3));
        assert_eq!(candidate.immunogenicity, Some(0.81));
        assert_eq!(candidate.tcr_rank, Some(0.02));
        assert_eq!(candidate.cdr3.as_deref(), Some("CASSIRSSYEQYF"));

        let mrna = report.mrna.as_ref().unwrap();
        assert_eq!(mrna.construct, "MVVGADGVGK");
        assert_eq!(mrna.design.mrna, "AUGGUUGUU");
        assert_eq!(mrna.design.cai, 0.812);
        assert_eq!(mrna.structure.mfe, -2.1);

        assert!(report.steps.iter().all(|s| !s.artifacts.is_empty()));
        let step1_fasta = fx.ctx.storage.download_text(&report.steps[0].artifacts[0].url).await.unwrap();
        assert!(step1_fasta.contains(">KRAS_G12D|8-16\nVVGADGVGK"));
        assert!(step1_fasta.contains(">KRAS_G12D|12-20\nDGVGKSALT"));
    }

    #[tokio::test]
    async fn test_run_short_circuits_on_empty_step() {
        let mut fx = fixture("Peptide,TAP\nVVGADGVGK,0.1\nDGVGKSALT,-0.4\n").await;
        mock_service(&mut fx.server, "/netchop", "results/netchop.csv").await;
        mock_service(&mut fx.server, "/nettap", "results/nettap.csv").await;
        let netmhcpan = fx
            .server
            .mock("POST", "/netmhcpan")
            .expect(0)
            .create_async()
            .await;

        let report = run(&fx.ctx, fx.input.clone(), &()).await.unwrap();

        netmhcpan.assert_async().await;
        assert_eq!(report.status, PipelineStatus::NoCandidates { step: 2 });
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[1].status, StepStatus::Empty);
        assert!(report.candidates.is_empty());
        assert!(report.mrna.is_none());
    }

    #[tokio::test]
    async fn test_service_text_answer_aborts_with_step_context() {
        let mut fx = fixture(NETTAP).await;
        fx.server
            .mock("POST", "/netchop")
            .with_status(200)
            .with_body(r#"{"type":"text","content":"NetChop crashed"}"#)
            .create_async()
            .await;

        let err = run(&fx.ctx, fx.input.clone(), &()).await.unwrap_err();
        match err {
            PipelineError::Step { step, message, .. } => {
                assert_eq!(step, 1);
                assert!(message.contains("NetChop crashed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_requires_hla() {
        let fx = fixture(NETTAP).await;
        let mut input = fx.input.clone();
        input.hla_alleles.clear();
        assert!(matches!(
            run(&fx.ctx, input, &()).await,
            Err(PipelineError::MissingInput(_))
        ));
    }

    #[test]
    fn test_peptide_coordinates() {
        let p = Peptide { sequence: "VVGADGVGK".into(), source: "KRAS_G12D".into(), start: 8 };
        assert_eq!(p.end(), 16);
        assert_eq!(p.fasta_id(), "KRAS_G12D|8-16");
    }
}
