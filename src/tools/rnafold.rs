//! RNAfold (ViennaRNA): minimum free energy secondary structure
//!
//! `RNAfold --noPS` prints the sequence followed by
//! `<dot-bracket> (<mfe>)`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{parse_args, CommandRunner, Tool, ToolError, ToolOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RnaStructure {
    pub sequence: String,
    pub structure: String,
    /// kcal/mol
    pub mfe: f64,
}

#[derive(Debug, Deserialize)]
struct RnaFoldArgs {
    sequence: String,
}

pub struct RnaFold {
    runner: CommandRunner,
}

impl RnaFold {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    pub async fn fold(&self, sequence: &str) -> Result<RnaStructure, ToolError> {
        let sequence = to_rna(sequence);
        if sequence.is_empty() || !sequence.chars().all(|c| matches!(c, 'A' | 'C' | 'G' | 'U')) {
            return Err(ToolError::Arguments {
                tool: "rnafold".to_string(),
                message: "sequence must contain only A, C, G, U/T".to_string(),
            });
        }

        let stdout = self.runner.run(&format!("{}\n", sequence)).await?;
        parse_output(&sequence, &stdout)
    }
}

fn to_rna(sequence: &str) -> String {
    sequence
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c.to_ascii_uppercase() {
            'T' => 'U',
            other => other,
        })
        .collect()
}

pub(crate) fn parse_output(sequence: &str, stdout: &str) -> Result<RnaStructure, ToolError> {
    let bad = |message: &str| ToolError::Output {
        tool: "rnafold".to_string(),
        message: message.to_string(),
    };

    for line in stdout.lines().map(str::trim) {
        let Some(structure) = line.split_whitespace().next() else {
            continue;
        };
        if structure.is_empty() || !structure.chars().all(|c| matches!(c, '.' | '(' | ')')) {
            continue;
        }

        let open = line.rfind('(').ok_or_else(|| bad("missing free energy"))?;
        let close = line.rfind(')').ok_or_else(|| bad("missing free energy"))?;
        if open <= structure.len() || close <= open {
            return Err(bad("missing free energy"));
        }
        let mfe = line[open + 1..close]
            .trim()
            .parse::<f64>()
            .map_err(|_| bad(&format!("cannot parse free energy in '{}'", line)))?;

        return Ok(RnaStructure {
            sequence: sequence.to_string(),
            structure: structure.to_string(),
            mfe,
        });
    }

    Err(bad("no structure line in RNAfold output"))
}

#[async_trait]
impl Tool for RnaFold {
    fn name(&self) -> &'static str {
        "rnafold"
    }

    fn description(&self) -> &'static str {
        "Predict the minimum free energy secondary structure of an RNA (or DNA, T is read as U) sequence with ViennaRNA RNAfold."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sequence": {"type": "string", "description": "Nucleotide sequence"}
            },
            "required": ["sequence"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: RnaFoldArgs = parse_args(self.name(), args)?;
        let folded = self.fold(&args.sequence).await?;
        Ok(ToolOutput::text(format!(
            "Structure: {}\nMFE: {:.2} kcal/mol",
            folded.structure, folded.mfe
        )))
    }
}
