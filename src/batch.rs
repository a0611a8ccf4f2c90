use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::domain::{PdbId, ProcessingOutcome};
use crate::dssp::GeometryAnalyzer;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, ProgressSink};
use crate::rcsb::StructureSource;

/// Result of the resume filter, computed once before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub total: usize,
    pub completed_before: usize,
    pub excluded: usize,
    /// Sorted, deduplicated.
    pub targets: Vec<PdbId>,
}

/// `targets = all - completed - excluded`.
///
/// Exclusion wins over everything; `excluded` counts only identifiers that
/// were not already completed.
pub fn plan_targets(
    all: &[PdbId],
    completed: &BTreeSet<PdbId>,
    excluded: &BTreeSet<PdbId>,
) -> BatchPlan {
    let unique = all.iter().cloned().collect::<BTreeSet<_>>();
    let completed_before = unique.intersection(completed).count();
    let excluded_count = unique
        .iter()
        .filter(|id| excluded.contains(*id) && !completed.contains(*id))
        .count();
    let targets = unique
        .into_iter()
        .filter(|id| !completed.contains(id) && !excluded.contains(id))
        .collect::<Vec<_>>();
    BatchPlan {
        total: all.len(),
        completed_before,
        excluded: excluded_count,
        targets,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentifierReport {
    pub id: PdbId,
    #[serde(flatten)]
    pub outcome: ProcessingOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: String,
    pub finished_at: String,
    pub total: usize,
    pub completed_before: usize,
    pub excluded: usize,
    pub submitted: usize,
    pub done: usize,
    pub download_failed: usize,
    pub parse_failed: usize,
    pub no_features: usize,
    pub failed: usize,
    pub outcomes: Vec<IdentifierReport>,
}

impl BatchReport {
    fn tally(plan: &BatchPlan, started_at: String, outcomes: Vec<IdentifierReport>) -> Self {
        let count = |predicate: fn(&ProcessingOutcome) -> bool| {
            outcomes
                .iter()
                .filter(|report| predicate(&report.outcome))
                .count()
        };
        Self {
            started_at,
            finished_at: iso_timestamp(),
            total: plan.total,
            completed_before: plan.completed_before,
            excluded: plan.excluded,
            submitted: plan.targets.len(),
            done: count(|outcome| matches!(outcome, ProcessingOutcome::Done { .. })),
            download_failed: count(|outcome| {
                matches!(outcome, ProcessingOutcome::SkippedDownloadFailed)
            }),
            parse_failed: count(|outcome| matches!(outcome, ProcessingOutcome::SkippedParseFailed)),
            no_features: count(|outcome| matches!(outcome, ProcessingOutcome::SkippedNoFeatures)),
            failed: count(|outcome| matches!(outcome, ProcessingOutcome::Failed { .. })),
            outcomes,
        }
    }

    pub fn skipped(&self) -> usize {
        self.submitted - self.done
    }
}

/// Fixed-size worker pool; each worker takes one identifier at a time.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    workers: usize,
}

impl Dispatcher {
    /// `workers == 0` uses one worker per available CPU.
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    pub fn dispatch<S: StructureSource, A: GeometryAnalyzer>(
        &self,
        pipeline: &Pipeline<S, A>,
        targets: &[PdbId],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<IdentifierReport>, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|index| format!("dssp-worker-{index}"))
            .build()
            .map_err(|err| PipelineError::InvalidConfig(err.to_string()))?;
        info!(
            workers = pool.current_num_threads(),
            targets = targets.len(),
            "dispatching"
        );
        Ok(pool.install(|| {
            targets
                .par_iter()
                .with_max_len(1)
                .map(|id| IdentifierReport {
                    id: id.clone(),
                    outcome: pipeline.process(id, sink),
                })
                .collect()
        }))
    }

    /// Scans the output directory, filters, and processes what is left.
    pub fn run<S: StructureSource, A: GeometryAnalyzer>(
        &self,
        pipeline: &Pipeline<S, A>,
        all: &[PdbId],
        excluded: &BTreeSet<PdbId>,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, PipelineError> {
        let started_at = iso_timestamp();
        let completed = pipeline.store().completed_ids()?;
        let plan = plan_targets(all, &completed, excluded);
        info!(
            total = plan.total,
            completed = plan.completed_before,
            excluded = plan.excluded,
            targets = plan.targets.len(),
            "resume filter applied"
        );
        let outcomes = self.dispatch(pipeline, &plan.targets, sink)?;
        let report = BatchReport::tally(&plan, started_at, outcomes);
        info!(
            done = report.done,
            skipped = report.skipped(),
            "batch finished"
        );
        Ok(report)
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<PdbId> {
        values.iter().map(|value| value.parse().unwrap()).collect()
    }

    #[test]
    fn plan_removes_completed_and_excluded() {
        let all = ids(&["4abc", "1abc", "2abc", "3abc", "1abc"]);
        let completed = ids(&["2abc"]).into_iter().collect();
        let excluded = ids(&["3abc", "2abc", "9zzz"]).into_iter().collect();

        let plan = plan_targets(&all, &completed, &excluded);
        assert_eq!(plan.targets, ids(&["1abc", "4abc"]));
        assert_eq!(plan.total, 5);
        assert_eq!(plan.completed_before, 1);
        assert_eq!(plan.excluded, 1);
    }
}
