use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StructureFormat {
    Cif,
    Pdb,
}

impl StructureFormat {
    /// Download order: mmCIF first, legacy PDB as fallback.
    pub const FALLBACK_ORDER: [StructureFormat; 2] = [StructureFormat::Cif, StructureFormat::Pdb];

    pub fn extension(self) -> &'static str {
        match self {
            StructureFormat::Cif => "cif",
            StructureFormat::Pdb => "pdb",
        }
    }
}

impl fmt::Display for StructureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Four character PDB entry code, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PdbId(String);

impl PdbId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form used by the RCSB file server (`1ABC.cif`).
    pub fn to_upper(&self) -> String {
        self.0.to_uppercase()
    }
}

impl fmt::Display for PdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PdbId {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid =
            normalized.len() == 4 && normalized.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(PipelineError::InvalidIdentifier(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// One output row: `resi,sstr,rasa,phi,psi`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidueFeature {
    pub resi: String,
    pub sstr: String,
    #[serde(serialize_with = "crate::features::serialize_decimal")]
    pub rasa: f64,
    #[serde(serialize_with = "crate::features::serialize_decimal")]
    pub phi: f64,
    #[serde(serialize_with = "crate::features::serialize_decimal")]
    pub psi: f64,
}

/// Features of one chain, in the order DSSP reported the residues.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainResult {
    pub ordinal: usize,
    pub rows: Vec<ResidueFeature>,
}

impl ChainResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Terminal state of one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Done { chains: usize, residues: usize },
    SkippedDownloadFailed,
    SkippedParseFailed,
    SkippedNoFeatures,
    Failed { reason: String },
}

impl ProcessingOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ProcessingOutcome::Done { .. })
    }
}

impl fmt::Display for ProcessingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingOutcome::Done { chains, residues } => {
                write!(f, "done ({chains} chains, {residues} residues)")
            }
            ProcessingOutcome::SkippedDownloadFailed => write!(f, "skipped: download failed"),
            ProcessingOutcome::SkippedParseFailed => write!(f, "skipped: parse failed"),
            ProcessingOutcome::SkippedNoFeatures => write!(f, "skipped: no features"),
            ProcessingOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Acquiring,
    Parsing,
    Splitting,
    Extracting { chains: usize },
    Writing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Pending => write!(f, "pending"),
            Stage::Acquiring => write!(f, "acquiring"),
            Stage::Parsing => write!(f, "parsing"),
            Stage::Splitting => write!(f, "splitting"),
            Stage::Extracting { chains } => write!(f, "extracting ({chains} chains)"),
            Stage::Writing => write!(f, "writing"),
            Stage::Done => write!(f, "done"),
            Stage::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub id: PdbId,
    pub stage: Stage,
    pub elapsed: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_pdb_id_lowercases() {
        let id: PdbId = " 1LYZ ".parse().unwrap();
        assert_eq!(id.as_str(), "1lyz");
        assert_eq!(id.to_upper(), "1LYZ");
    }

    #[test]
    fn parse_pdb_id_invalid() {
        let err = "1ly".parse::<PdbId>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidIdentifier(_));
        let err = "1l-z".parse::<PdbId>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidIdentifier(_));
    }

    #[test]
    fn fallback_order_starts_with_cif() {
        assert_eq!(StructureFormat::FALLBACK_ORDER[0], StructureFormat::Cif);
        assert_eq!(StructureFormat::Pdb.to_string(), "pdb");
    }
}
