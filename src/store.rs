use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::domain::{ChainResult, PdbId};
use crate::error::PipelineError;

pub const CSV_HEADER: &str = "resi,sstr,rasa,phi,psi";

/// Any `{id}_*.csv` marks the identifier as completed, not only `{id}_{ordinal}.csv`.
static CHAIN_CSV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9a-z]{4})_.*\.csv$").unwrap());

/// Output directory holding `{id}_{ordinal}.csv` files.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: Utf8PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))
    }

    pub fn chain_path(&self, id: &PdbId, ordinal: usize) -> Utf8PathBuf {
        self.root.join(format!("{id}_{ordinal}.csv"))
    }

    /// Writes one CSV per non-empty chain result.
    ///
    /// Fails with `NoFeatures` when there is nothing to write. Each file is
    /// staged in the output directory and renamed into place.
    pub fn write(
        &self,
        id: &PdbId,
        results: &[ChainResult],
    ) -> Result<Vec<Utf8PathBuf>, PipelineError> {
        let non_empty = results
            .iter()
            .filter(|result| !result.is_empty())
            .collect::<Vec<_>>();
        if non_empty.is_empty() {
            return Err(PipelineError::NoFeatures(id.to_string()));
        }
        self.ensure_root()?;

        non_empty
            .into_iter()
            .map(|result| {
                let path = self.chain_path(id, result.ordinal);
                self.write_chain(&path, result)?;
                Ok(path)
            })
            .collect()
    }

    fn write_chain(&self, path: &Utf8Path, result: &ChainResult) -> Result<(), PipelineError> {
        let mut temp = tempfile::Builder::new()
            .prefix(".dssp-batch")
            .suffix(".tmp")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        {
            let mut writer = csv::Writer::from_writer(temp.as_file_mut());
            for row in &result.rows {
                writer
                    .serialize(row)
                    .map_err(|err| PipelineError::Output(err.to_string()))?;
            }
            writer
                .flush()
                .map_err(|err| PipelineError::Output(err.to_string()))?;
        }
        temp.as_file_mut()
            .flush()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Identifiers with at least one chain CSV in the output directory.
    pub fn completed_ids(&self) -> Result<BTreeSet<PdbId>, PipelineError> {
        if !self.root.as_std_path().exists() {
            return Ok(BTreeSet::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let mut completed = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(captures) = CHAIN_CSV.captures(name)
                && let Ok(id) = captures[1].parse::<PdbId>()
            {
                completed.insert(id);
            }
        }
        Ok(completed)
    }
}

/// Reads a newline-delimited identifier list. Blank lines and `#` comments are skipped.
pub fn read_id_list(path: &Utf8Path) -> Result<Vec<PdbId>, PipelineError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(format!("read {path}: {err}")))?;
    parse_id_list(&content)
}

pub fn parse_id_list(content: &str) -> Result<Vec<PdbId>, PipelineError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.parse::<PdbId>())
        .collect()
}
