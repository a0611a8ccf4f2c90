use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use camino::Utf8PathBuf;
use tempfile::TempDir;
use tracing::warn;

use crate::domain::{PdbId, ProcessingOutcome, ProgressEvent, Stage, StructureFormat};
use crate::dssp::GeometryAnalyzer;
use crate::error::{FailureOrigin, PipelineError};
use crate::features::extract_all;
use crate::rcsb::StructureSource;
use crate::store::OutputStore;
use crate::structure::{acquire_structure, split_chains};

/// Receives stage transitions. Shared by all workers of a batch.
pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Parent of the per-identifier scratch directories; system temp dir if unset.
    pub scratch_root: Option<Utf8PathBuf>,
    pub chain_format: StructureFormat,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            scratch_root: None,
            chain_format: StructureFormat::Cif,
        }
    }
}

/// Per-identifier orchestration: acquire, parse, split, extract, write.
///
/// Every identifier runs in its own scratch directory, which is removed when
/// processing returns or unwinds. Paths are passed explicitly to each stage;
/// nothing depends on the process working directory.
pub struct Pipeline<S: StructureSource, A: GeometryAnalyzer> {
    source: S,
    analyzer: A,
    store: OutputStore,
    options: PipelineOptions,
}

impl<S: StructureSource, A: GeometryAnalyzer> Pipeline<S, A> {
    pub fn new(source: S, analyzer: A, store: OutputStore, options: PipelineOptions) -> Self {
        Self {
            source,
            analyzer,
            store,
            options,
        }
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    /// Processes one identifier to a terminal outcome. Never panics or errors.
    pub fn process(&self, id: &PdbId, sink: &dyn ProgressSink) -> ProcessingOutcome {
        let start = Instant::now();
        let emit = |stage: Stage| {
            sink.event(ProgressEvent {
                id: id.clone(),
                stage,
                elapsed: Some(start.elapsed()),
            })
        };
        emit(Stage::Pending);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run(id, &emit)));
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                let outcome = classify(&err);
                warn!(%id, outcome = ?outcome, "skipped: {err}");
                outcome
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                warn!(%id, "skipped: worker panicked: {reason}");
                ProcessingOutcome::Failed { reason }
            }
        };

        emit(if outcome.is_done() {
            Stage::Done
        } else {
            Stage::Failed
        });
        outcome
    }

    fn run(&self, id: &PdbId, emit: &dyn Fn(Stage)) -> Result<ProcessingOutcome, PipelineError> {
        let scratch = self.scratch_dir(id)?;
        let dir = scratch.path();

        let parsed = acquire_structure(id, &self.source, dir, &mut |stage| emit(stage))?;

        emit(Stage::Splitting);
        let chains = split_chains(id, &parsed.pdb, dir, self.options.chain_format)?;

        emit(Stage::Extracting {
            chains: chains.len(),
        });
        let results = extract_all(&chains, &self.analyzer, dir);

        emit(Stage::Writing);
        self.store.write(id, &results)?;

        Ok(ProcessingOutcome::Done {
            chains: results.len(),
            residues: results.iter().map(|result| result.rows.len()).sum(),
        })
    }

    fn scratch_dir(&self, id: &PdbId) -> Result<TempDir, PipelineError> {
        let prefix = format!("dssp-batch-{id}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match &self.options.scratch_root {
            Some(root) => {
                fs::create_dir_all(root.as_std_path())
                    .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
                builder.tempdir_in(root.as_std_path())
            }
            None => builder.tempdir(),
        };
        dir.map_err(|err| PipelineError::Filesystem(err.to_string()))
    }
}

/// Maps a pipeline error to the outcome reported for the identifier.
pub fn classify(err: &PipelineError) -> ProcessingOutcome {
    match err {
        PipelineError::Structure {
            origin: FailureOrigin::Download,
            ..
        }
        | PipelineError::Download { .. } => ProcessingOutcome::SkippedDownloadFailed,
        PipelineError::Structure {
            origin: FailureOrigin::Parse,
            ..
        }
        | PipelineError::Parse { .. } => ProcessingOutcome::SkippedParseFailed,
        PipelineError::NoFeatures(_) => ProcessingOutcome::SkippedNoFeatures,
        other => ProcessingOutcome::Failed {
            reason: other.to_string(),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
