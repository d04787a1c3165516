//! LinearDesign: joint codon and structure optimization of mRNA
//!
//! Reads a protein sequence on stdin and prints
//!
//! ```text
//! mRNA sequence:  AUGCCAAAC...
//! mRNA structure: ......(((...
//! mRNA folding free energy: -48.10 kcal/mol; mRNA CAI: 0.696
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{parse_args, CommandRunner, Tool, ToolError, ToolOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MrnaDesign {
    pub protein: String,
    pub mrna: String,
    pub structure: String,
    /// kcal/mol
    pub mfe: f64,
    pub cai: f64,
}

#[derive(Debug, Deserialize)]
struct LinearDesignArgs {
    protein: String,
}

pub struct LinearDesign {
    runner: CommandRunner,
}

impl LinearDesign {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    pub async fn design(&self, protein: &str) -> Result<MrnaDesign, ToolError> {
        let protein: String = protein
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        let record = crate::fasta::FastaRecord::new("protein", protein.clone());
        crate::fasta::validate_protein(&record).map_err(|e| ToolError::Arguments {
            tool: "lineardesign".to_string(),
            message: e.to_string(),
        })?;

        let stdout = self.runner.run(&format!("{}\n", protein)).await?;
        parse_output(&protein, &stdout)
    }
}

fn field<'a>(stdout: &'a str, label: &str) -> Option<&'a str> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix(label))
        .map(str::trim)
}

pub(crate) fn parse_output(protein: &str, stdout: &str) -> Result<MrnaDesign, ToolError> {
    let bad = |message: String| ToolError::Output {
        tool: "lineardesign".to_string(),
        message,
    };

    let mrna = field(stdout, "mRNA sequence:").ok_or_else(|| bad("missing mRNA sequence".to_string()))?;
    let structure = field(stdout, "mRNA structure:").unwrap_or_default();
    let energy_line =
        field(stdout, "mRNA folding free energy:").ok_or_else(|| bad("missing folding free energy".to_string()))?;

    // "-48.10 kcal/mol; mRNA CAI: 0.696"
    let (energy_part, cai_part) = energy_line.split_once(';').unwrap_or((energy_line, ""));
    let mfe = energy_part
        .trim()
        .trim_end_matches("kcal/mol")
        .trim()
        .parse::<f64>()
        .map_err(|_| bad(format!("cannot parse free energy '{}'", energy_part.trim())))?;
    let cai = cai_part
        .trim()
        .strip_prefix("mRNA CAI:")
        .map(str::trim)
        .unwrap_or("0")
        .parse::<f64>()
        .map_err(|_| bad(format!("cannot parse CAI '{}'", cai_part.trim())))?;

    if mrna.is_empty() {
        return Err(bad("empty mRNA sequence".to_string()));
    }

    Ok(MrnaDesign {
        protein: protein.to_string(),
        mrna: mrna.to_string(),
        structure: structure.to_string(),
        mfe,
        cai,
    })
}

#[async_trait]
impl Tool for LinearDesign {
    fn name(&self) -> &'static str {
        "lineardesign"
    }

    fn description(&self) -> &'static str {
        "Design a codon-optimized, stably folded mRNA encoding a protein or polyepitope sequence with LinearDesign. Returns the mRNA sequence, structure, folding free energy and CAI."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "protein": {"type": "string", "description": "Amino acid sequence to encode"}
            },
            "required": ["protein"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: LinearDesignArgs = parse_args(self.name(), args)?;
        let design = self.design(&args.protein).await?;
        Ok(ToolOutput::text(format!(
            "mRNA: {}\nStructure: {}\nMFE: {:.2} kcal/mol\nCAI: {:.3}",
            design.mrna, design.structure, design.mfe, design.cai
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "mRNA sequence:  AUGCCAAACACCAUU\n\
                          mRNA structure: ......(((...)))\n\
                          mRNA folding free energy: -48.10 kcal/mol; mRNA CAI: 0.696\n";

    #[test]
    fn test_parse_output() {
        let design = parse_output("MPNTI", OUTPUT).unwrap();
        assert_eq!(design.mrna, "AUGCCAAACACCAUU");
        assert_eq!(design.structure, "......(((...)))");
        assert_eq!(design.mfe, -48.1);
        assert_eq!(design.cai, 0.696);
    }

    #[test]
    fn test_parse_output_missing_fields() {
        assert!(parse_output("M", "mRNA structure: ...\n").is_err());
        assert!(parse_output("M", "mRNA sequence: AUG\nmRNA folding free energy: n/a\n").is_err());
    }

    #[tokio::test]
    async fn test_design_rejects_invalid_protein() {
        let runner = CommandRunner::new("lineardesign", "true", vec![], std::time::Duration::from_secs(1));
        let err = LinearDesign::new(runner).design("MK7").await.unwrap_err();
        assert!(matches!(err, ToolError::Arguments { .. }));
    }
}
