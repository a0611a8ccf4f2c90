use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::StructureFormat;
use crate::error::PipelineError;
use crate::retry::{Backoff, RetryPolicy, Unconditional};

pub const DEFAULT_CONFIG_FILE: &str = "dssp-batch.json";
pub const DEFAULT_BASE_URL: &str = "https://files.rcsb.org/download";
pub const DEFAULT_SEARCH_URL: &str = "https://search.rcsb.org/rcsbsearch/v2/query";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub scratch_dir: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub exclude_file: Option<String>,
    #[serde(default)]
    pub download: DownloadSection,
    #[serde(default)]
    pub dssp: DsspSection,
    #[serde(default)]
    pub search: SearchSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DownloadSection {
    #[serde(default)]
    pub max_attempts: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub backoff_ms: Option<u64>,
    #[serde(default)]
    pub stop_on_not_found: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DsspSection {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub chain_format: Option<StructureFormat>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SearchSection {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub max_resolution: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    pub max_attempts: usize,
    pub timeout: Duration,
    pub backoff: Duration,
    pub stop_on_not_found: bool,
}

impl DownloadSettings {
    /// Zero backoff without 404 short-circuit keeps the plain fixed budget.
    pub fn retry_policy(&self) -> Box<dyn RetryPolicy> {
        if self.backoff.is_zero() && !self.stop_on_not_found {
            Box::new(Unconditional::new(self.max_attempts))
        } else {
            Box::new(Backoff {
                max_attempts: self.max_attempts,
                base_delay: self.backoff,
                stop_on_not_found: self.stop_on_not_found,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DsspSettings {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
    pub chain_format: StructureFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub url: String,
    pub max_resolution: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_url: String,
    pub output_dir: Utf8PathBuf,
    pub scratch_dir: Option<Utf8PathBuf>,
    pub workers: usize,
    pub exclude_file: Option<Utf8PathBuf>,
    pub download: DownloadSettings,
    pub dssp: DsspSettings,
    pub search: SearchSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `dssp-batch.json` when present. Without either, defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PipelineError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let max_attempts = config.download.max_attempts.unwrap_or(100);
        if max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "download.max_attempts must be at least 1".to_string(),
            ));
        }
        let download = DownloadSettings {
            max_attempts,
            timeout: Duration::from_secs(config.download.timeout_secs.unwrap_or(10)),
            backoff: Duration::from_millis(config.download.backoff_ms.unwrap_or(0)),
            stop_on_not_found: config.download.stop_on_not_found.unwrap_or(false),
        };

        let dssp = DsspSettings {
            program: config.dssp.program.unwrap_or_else(|| "mkdssp".to_string()),
            args: config.dssp.args.unwrap_or_else(default_dssp_args),
            timeout: config.dssp.timeout_secs.map(Duration::from_secs),
            chain_format: config.dssp.chain_format.unwrap_or(StructureFormat::Cif),
        };

        let search = SearchSettings {
            url: config
                .search
                .url
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            max_resolution: config.search.max_resolution,
        };

        Ok(ResolvedConfig {
            schema_version,
            base_url: config
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            output_dir: Utf8PathBuf::from(config.output_dir.unwrap_or_else(|| "dssp".to_string())),
            scratch_dir: config.scratch_dir.map(Utf8PathBuf::from),
            workers: config.workers.unwrap_or(0),
            exclude_file: config.exclude_file.map(Utf8PathBuf::from),
            download,
            dssp,
            search,
        })
    }
}

pub fn default_dssp_args() -> Vec<String> {
    vec!["--output-format".to_string(), "dssp".to_string()]
}
