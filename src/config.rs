use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub storage: StorageConfig,
    pub services: ServicesConfig,
    pub pipeline: PipelineConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
    /// Conversation threads kept in memory before the oldest are evicted
    pub max_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl LLMConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// "minio" or "memory"
    pub provider: String,
    pub endpoint: String,
    /// Endpoint used when building download links handed to users
    pub public_endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Endpoints and commands of the external prediction tools
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    pub netchop_url: String,
    pub nettap_url: String,
    pub netmhcpan_url: String,
    pub netmhcstabpan_url: String,
    pub bigmhc_url: String,
    pub pmtnet_url: String,
    pub esmfold_url: String,
    pub rnafold_cmd: Vec<String>,
    pub lineardesign_cmd: Vec<String>,
    pub timeout_secs: u64,
}

impl ServicesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Filtering thresholds applied between pipeline steps
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    pub cleavage_score_min: f64,
    pub tap_score_min: f64,
    pub affinity_rank_max: f64,
    pub immunogenicity_min: f64,
    pub tcr_rank_max: f64,
    pub peptide_lengths: Vec<usize>,
    pub epitope_linker: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cleavage_score_min: 0.5,
            tap_score_min: 0.5,
            affinity_rank_max: 2.0,
            immunogenicity_min: 0.5,
            tcr_rank_max: 0.1,
            peptide_lengths: vec![8, 9, 10, 11],
            epitope_linker: "AAY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub brand: String,
    pub watermark: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(key, default)
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}", key))
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// MHC class I binding lengths accepted in `PEPTIDE_LENGTHS`
pub const PEPTIDE_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 8..=15;

fn parse_lengths(raw: &str) -> Result<Vec<usize>> {
    let lengths = split_list(raw, ',')
        .iter()
        .map(|s| s.parse::<usize>().with_context(|| format!("Invalid peptide length: {}", s)))
        .collect::<Result<Vec<_>>>()?;
    if let Some(bad) = lengths.iter().find(|l| !PEPTIDE_LENGTH_RANGE.contains(*l)) {
        anyhow::bail!(
            "Peptide length {} is outside {}..={}",
            bad,
            PEPTIDE_LENGTH_RANGE.start(),
            PEPTIDE_LENGTH_RANGE.end()
        );
    }
    if lengths.is_empty() {
        anyhow::bail!("PEPTIDE_LENGTHS must list at least one length");
    }
    Ok(lengths)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let minio_endpoint = var_or("MINIO_ENDPOINT", "http://localhost:9000");

        Ok(Self {
            server: ServerConfig {
                port: parse_var("PORT", "8000")?,
                host: var_or("HOST", "0.0.0.0"),
                cors_allowed_origins: split_list(
                    &var_or("ALLOWED_ORIGINS", "http://localhost:8501,http://localhost:3000"),
                    ',',
                ),
                max_threads: parse_var("MAX_THREADS", "1000")?,
            },
            llm: LLMConfig {
                base_url: var_or("LLM_BASE_URL", "https://api.openai.com/v1"),
                api_key: env::var("LLM_API_KEY").unwrap_or_default(),
                model: var_or("LLM_MODEL", "gpt-4o"),
                temperature: parse_var("LLM_TEMPERATURE", "0.2")?,
                max_tokens: parse_var("LLM_MAX_TOKENS", "2048")?,
                timeout_secs: parse_var("LLM_TIMEOUT_SECS", "120")?,
            },
            storage: StorageConfig {
                provider: var_or("STORAGE_PROVIDER", "minio"),
                public_endpoint: env::var("MINIO_PUBLIC_ENDPOINT").unwrap_or_else(|_| minio_endpoint.clone()),
                endpoint: minio_endpoint,
                bucket: var_or("MINIO_BUCKET", "neoagent"),
                region: var_or("MINIO_REGION", "us-east-1"),
                access_key: env::var("MINIO_ACCESS_KEY").ok(),
                secret_key: env::var("MINIO_SECRET_KEY").ok(),
            },
            services: ServicesConfig {
                netchop_url: var_or("NETCHOP_URL", "http://localhost:8001/netchop"),
                nettap_url: var_or("NETTAP_URL", "http://localhost:8002/nettap"),
                netmhcpan_url: var_or("NETMHCPAN_URL", "http://localhost:8003/netmhcpan"),
                netmhcstabpan_url: var_or("NETMHCSTABPAN_URL", "http://localhost:8004/netmhcstabpan"),
                bigmhc_url: var_or("BIGMHC_URL", "http://localhost:8005/bigmhc_im"),
                pmtnet_url: var_or("PMTNET_URL", "http://localhost:8006/pmtnet"),
                esmfold_url: var_or("ESMFOLD_URL", "http://localhost:8007/esmfold"),
                rnafold_cmd: split_list(&var_or("RNAFOLD_CMD", "RNAfold --noPS"), ' '),
                lineardesign_cmd: split_list(&var_or("LINEARDESIGN_CMD", "lineardesign --lambda 3"), ' '),
                timeout_secs: parse_var("TOOL_TIMEOUT_SECS", "600")?,
            },
            pipeline: PipelineConfig {
                cleavage_score_min: parse_var("CLEAVAGE_SCORE_MIN", "0.5")?,
                tap_score_min: parse_var("TAP_SCORE_MIN", "0.5")?,
                affinity_rank_max: parse_var("AFFINITY_RANK_MAX", "2.0")?,
                immunogenicity_min: parse_var("IMMUNOGENICITY_MIN", "0.5")?,
                tcr_rank_max: parse_var("TCR_RANK_MAX", "0.1")?,
                peptide_lengths: parse_lengths(&var_or("PEPTIDE_LENGTHS", "8,9,10,11"))?,
                epitope_linker: var_or("EPITOPE_LINKER", "AAY").to_uppercase(),
            },
            report: ReportConfig {
                brand: var_or("REPORT_BRAND", "NeoAgent"),
                watermark: var_or("REPORT_WATERMARK", "NeoAgent - Research Use Only"),
            },
            logging: LoggingConfig {
                log_dir: env::var("LOG_DIR").ok().map(PathBuf::from),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(split_list(" a, b ,,c ", ','), vec!["a", "b", "c"]);
        assert_eq!(split_list("RNAfold  --noPS", ' '), vec!["RNAfold", "--noPS"]);
    }

    #[test]
    fn test_parse_lengths() {
        assert_eq!(parse_lengths("9,10").unwrap(), vec![9, 10]);
        assert!(parse_lengths("nine").is_err());
        assert!(parse_lengths(" , ").is_err());
        assert!(parse_lengths("0,9").is_err());
        assert!(parse_lengths("9,40").is_err());
    }

    #[test]
    fn test_pipeline_defaults() {
        let defaults = PipelineConfig::default();
        assert_eq!(defaults.affinity_rank_max, 2.0);
        assert_eq!(defaults.peptide_lengths, vec![8, 9, 10, 11]);
        assert_eq!(defaults.epitope_linker, "AAY");
    }
}
