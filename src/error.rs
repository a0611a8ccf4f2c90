use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::StructureFormat;

/// Stage in which a structure could not be obtained for any format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    Download,
    Parse,
}

impl fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureOrigin::Download => write!(f, "download"),
            FailureOrigin::Parse => write!(f, "parse"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid structure identifier: {0}")]
    InvalidIdentifier(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("RCSB request failed: {0}")]
    RcsbHttp(String),

    #[error("RCSB returned status {status}: {message}")]
    RcsbStatus { status: u16, message: String },

    #[error("download of {id}.{format} failed after {attempts} attempt(s): {last}")]
    Download {
        id: String,
        format: StructureFormat,
        attempts: usize,
        last: String,
    },

    #[error("failed to parse {format} structure: {message}")]
    Parse {
        format: StructureFormat,
        message: String,
    },

    #[error("no usable structure for {id}: {origin} failed for every format")]
    Structure { id: String, origin: FailureOrigin },

    #[error("failed to write chain structure: {0}")]
    ChainWrite(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("DSSP failed: {0}")]
    Extraction(String),

    #[error("DSSP produced no features for any chain of {0}")]
    NoFeatures(String),

    #[error("failed to write results: {0}")]
    Output(String),
}
