use std::io::{self, Write};

use serde::Serialize;
use tracing::debug;

use crate::batch::{BatchReport, IdentifierReport};
use crate::domain::{PdbId, ProgressEvent};
use crate::pipeline::ProgressSink;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

/// Forwards stage transitions to `tracing` at debug level.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        let elapsed_ms = event.elapsed.map(|elapsed| elapsed.as_millis()).unwrap_or(0);
        debug!(id = %event.id, stage = %event.stage, elapsed_ms, "stage");
    }
}

pub struct JsonOutput;

#[derive(Serialize)]
struct TargetList<'a> {
    count: usize,
    targets: &'a [PdbId],
}

impl JsonOutput {
    pub fn print_report(report: &BatchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_targets(targets: &[PdbId]) -> io::Result<()> {
        Self::print_json(&TargetList {
            count: targets.len(),
            targets,
        })
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub fn print_summary(report: &BatchReport) {
    println!("dssp-batch summary");
    println!("  identifiers listed:   {}", report.total);
    println!("  already completed:    {}", report.completed_before);
    println!("  excluded:             {}", report.excluded);
    println!("  submitted:            {}", report.submitted);
    println!("  done:                 {}", report.done);
    println!("  download failed:      {}", report.download_failed);
    println!("  parse failed:         {}", report.parse_failed);
    println!("  no features:          {}", report.no_features);
    println!("  failed:               {}", report.failed);
    println!("  started:  {}", report.started_at);
    println!("  finished: {}", report.finished_at);
}

pub fn print_outcome(report: &IdentifierReport) {
    println!("{}: {}", report.id, report.outcome);
}

pub fn print_targets(targets: &[PdbId]) {
    for id in targets {
        println!("{id}");
    }
}
