//! Command line: HTTP server, terminal chat and one-shot pipeline runs

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use neoagent::agents::{AgentEvent, AgentRequest, EventSink, PatientFiles};
use neoagent::config::Config;
use neoagent::pipeline::{self, PipelineInput, StepObserver, StepOutcome};
use neoagent::report;
use neoagent::storage::{ObjectUrl, Storage};
use neoagent::tools::netmhcpan::{extract_alleles, parse_allele_list};
use neoagent::types::Language;
use neoagent::Agent;

#[derive(Parser)]
#[command(name = "neoagent", version, about = "Neoantigen selection agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Chat with the agent in the terminal
    Chat(ChatArgs),
    /// Run pipeline steps 1 to 6 on local files and print the report
    Pipeline(PipelineArgs),
}

#[derive(Args)]
pub struct ChatArgs {
    /// Mutation FASTA attached to the first turn
    #[arg(long)]
    pub mutation_file: Option<PathBuf>,
    /// HLA typing file attached to the first turn
    #[arg(long)]
    pub hla_file: Option<PathBuf>,
    /// CDR3 list attached to the first turn
    #[arg(long)]
    pub cdr3_file: Option<PathBuf>,
}

#[derive(Args)]
pub struct PipelineArgs {
    /// Mutation FASTA
    #[arg(long)]
    pub mutation_file: PathBuf,
    /// HLA alleles, e.g. HLA-A*02:01 (repeatable)
    #[arg(long = "hla", required_unless_present = "hla_file")]
    pub hla: Vec<String>,
    /// File listing the patient's HLA alleles
    #[arg(long)]
    pub hla_file: Option<PathBuf>,
    /// CDR3 sequences for step 5
    #[arg(long)]
    pub cdr3_file: Option<PathBuf>,
    /// Report language
    #[arg(long, value_parser = ["en", "zh"], default_value = "en")]
    pub lang: String,
}

async fn upload(storage: &Storage, path: &Path) -> anyhow::Result<ObjectUrl> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    Ok(storage.upload_file("uploads", filename, data).await?)
}

async fn upload_opt(storage: &Storage, path: Option<&Path>) -> anyhow::Result<Option<ObjectUrl>> {
    match path {
        Some(path) => Ok(Some(upload(storage, path).await?)),
        None => Ok(None),
    }
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::Text { content } => print!("{}", content),
        AgentEvent::Link { url, content } => println!("\n{}: {}", content, url),
        AgentEvent::Route { route } => eprintln!("[route: {:?}]", route),
        AgentEvent::ToolStart { name, .. } => eprintln!("[{} running]", name),
        AgentEvent::ToolEnd { name, output } => eprintln!("[{} done: {}]", name, output.content()),
        AgentEvent::Step { outcome } => print_step(outcome),
        AgentEvent::Done { .. } => println!(),
    }
    let _ = std::io::stdout().flush();
}

fn print_step(outcome: &StepOutcome) {
    eprintln!(
        "[step {} {}: {}/{} passed ({}), {:?}]",
        outcome.step, outcome.name, outcome.passed_count, outcome.input_count, outcome.criterion, outcome.status
    );
}

pub async fn chat(agent: &Agent, args: ChatArgs) -> anyhow::Result<()> {
    let storage = agent.storage();
    let mut files = PatientFiles {
        mutation_file: upload_opt(storage, args.mutation_file.as_deref()).await?,
        hla_file: upload_opt(storage, args.hla_file.as_deref()).await?,
        cdr3_file: upload_opt(storage, args.cdr3_file.as_deref()).await?,
        ..Default::default()
    };

    println!("NeoAgent chat. Empty line or Ctrl-D to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut thread_id: Option<String> = None;

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim().to_string();
        if message.is_empty() {
            break;
        }

        let (sink, mut rx) = EventSink::channel(64);
        let request = AgentRequest {
            message,
            thread_id: thread_id.clone(),
            files: std::mem::take(&mut files),
        };

        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_event(&event);
            }
        });
        match agent.run(request, sink).await {
            Ok(id) => thread_id = Some(id),
            Err(e) => eprintln!("error: {}", e),
        }
        printer.await?;
    }

    Ok(())
}

struct StepPrinter;

#[async_trait]
impl StepObserver for StepPrinter {
    async fn on_step(&self, outcome: &StepOutcome) {
        print_step(outcome);
    }
}

pub async fn pipeline(agent: &Agent, config: &Config, args: PipelineArgs) -> anyhow::Result<()> {
    let ctx = agent.pipeline();
    let storage = &ctx.storage;

    let mut alleles = parse_allele_list(&args.hla.join(","));
    if let Some(path) = &args.hla_file {
        for allele in extract_alleles(&tokio::fs::read_to_string(path).await?) {
            if !alleles.contains(&allele) {
                alleles.push(allele);
            }
        }
    }

    let input = PipelineInput {
        mutation_file: upload(storage, &args.mutation_file).await?,
        hla_alleles: alleles,
        cdr3_file: upload_opt(storage, args.cdr3_file.as_deref()).await?,
    };

    let language = if args.lang == "zh" { Language::Zh } else { Language::En };
    let result = pipeline::run(ctx, input, &StepPrinter).await?;

    println!("{}", report::render_markdown(&result, language));
    for link in report::publish(storage, &result, language, &config.report).await? {
        if let Some(url) = link.url() {
            eprintln!("{}: {}", link.content(), url);
        }
    }
    Ok(())
}
