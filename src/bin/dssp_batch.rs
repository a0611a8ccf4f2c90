use std::collections::BTreeSet;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dssp_batch::batch::{Dispatcher, IdentifierReport, plan_targets};
use dssp_batch::config::{ConfigLoader, ResolvedConfig};
use dssp_batch::domain::{PdbId, StructureFormat};
use dssp_batch::dssp::MkdsspAnalyzer;
use dssp_batch::error::PipelineError;
use dssp_batch::output::{
    JsonOutput, OutputMode, TracingSink, print_outcome, print_summary, print_targets,
};
use dssp_batch::pipeline::{Pipeline, PipelineOptions, ProgressSink};
use dssp_batch::rcsb::{IdLister, RcsbHttpClient, RcsbSearchClient};
use dssp_batch::store::{OutputStore, read_id_list};

#[derive(Parser)]
#[command(name = "dssp-batch")]
#[command(about = "Per-chain DSSP features (sstr, rasa, phi, psi) for many PDB entries")]
#[command(version)]
struct Cli {
    /// JSON config file (default: ./dssp-batch.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON to stdout
    #[arg(long, global = true)]
    json: bool,

    /// -v for debug, -vv for trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Process every listed identifier not yet completed or excluded")]
    Run(RunArgs),
    #[command(about = "Print the identifiers a run would submit")]
    Targets(RunArgs),
    #[command(about = "Process a single identifier")]
    Process(ProcessArgs),
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// Newline-delimited identifier list
    #[arg(long, conflicts_with = "search")]
    ids: Option<String>,

    /// List identifiers through the RCSB search API
    #[arg(long)]
    search: bool,

    /// Maximum resolution (Å) for --search
    #[arg(long)]
    max_resolution: Option<f64>,

    /// Newline-delimited identifiers never to process
    #[arg(long)]
    exclude: Option<String>,
}

#[derive(Args, Clone, Default)]
struct Overrides {
    #[arg(short, long)]
    output_dir: Option<String>,

    #[arg(long)]
    scratch_dir: Option<String>,

    /// Worker count; 0 uses every CPU
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    max_attempts: Option<usize>,

    /// DSSP executable
    #[arg(long)]
    dssp: Option<String>,

    /// Kill DSSP after this many seconds
    #[arg(long)]
    dssp_timeout: Option<u64>,

    /// Format of the per-chain files handed to DSSP
    #[arg(long)]
    chain_format: Option<StructureFormat>,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args, Clone)]
struct ProcessArgs {
    id: String,

    #[command(flatten)]
    overrides: Overrides,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::InvalidIdentifier(_)
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_)
        | PipelineError::InvalidConfig(_) => 2,
        PipelineError::RcsbHttp(_)
        | PipelineError::RcsbStatus { .. }
        | PipelineError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dssp_batch={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => run_batch(args, config, output_mode),
        Commands::Targets(args) => run_targets(args, config, output_mode),
        Commands::Process(args) => run_single(args, config, output_mode),
    }
}

fn apply_overrides(mut config: ResolvedConfig, overrides: Overrides) -> ResolvedConfig {
    if let Some(dir) = overrides.output_dir {
        config.output_dir = Utf8PathBuf::from(dir);
    }
    if let Some(dir) = overrides.scratch_dir {
        config.scratch_dir = Some(Utf8PathBuf::from(dir));
    }
    if let Some(workers) = overrides.workers {
        config.workers = workers;
    }
    if let Some(url) = overrides.base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(attempts) = overrides.max_attempts {
        config.download.max_attempts = attempts.max(1);
    }
    if let Some(program) = overrides.dssp {
        config.dssp.program = program;
    }
    if let Some(secs) = overrides.dssp_timeout {
        config.dssp.timeout = Some(std::time::Duration::from_secs(secs));
    }
    if let Some(format) = overrides.chain_format {
        config.dssp.chain_format = format;
    }
    config
}

fn build_pipeline(
    config: &ResolvedConfig,
) -> Result<Pipeline<RcsbHttpClient, MkdsspAnalyzer>, PipelineError> {
    let source = RcsbHttpClient::new(&config.base_url, &config.download)?;
    let analyzer = MkdsspAnalyzer::new(&config.dssp)?;
    info!(
        program = %analyzer.program().display(),
        version = analyzer.version().as_deref().unwrap_or("unknown"),
        "using DSSP"
    );
    let store = OutputStore::new(config.output_dir.clone());
    store.ensure_root()?;
    let options = PipelineOptions {
        scratch_root: config.scratch_dir.clone(),
        chain_format: config.dssp.chain_format,
    };
    Ok(Pipeline::new(source, analyzer, store, options))
}

fn load_ids(source: &SourceArgs, config: &mut ResolvedConfig) -> Result<Vec<PdbId>, PipelineError> {
    if let Some(path) = &source.ids {
        return read_id_list(&Utf8PathBuf::from(path));
    }
    if source.search {
        if source.max_resolution.is_some() {
            config.search.max_resolution = source.max_resolution;
        }
        let lister = RcsbSearchClient::new(config.search.clone())?;
        return lister.list_ids();
    }
    Err(PipelineError::InvalidConfig(
        "identifier source required: pass --ids <FILE> or --search".to_string(),
    ))
}

fn load_excluded(
    source: &SourceArgs,
    config: &ResolvedConfig,
) -> Result<BTreeSet<PdbId>, PipelineError> {
    let path = source
        .exclude
        .as_ref()
        .map(Utf8PathBuf::from)
        .or_else(|| config.exclude_file.clone());
    match path {
        Some(path) => Ok(read_id_list(&path)?.into_iter().collect()),
        None => Ok(BTreeSet::new()),
    }
}

fn run_batch(args: RunArgs, config: ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let mut config = apply_overrides(config, args.overrides);
    let ids = load_ids(&args.source, &mut config)?;
    let excluded = load_excluded(&args.source, &config)?;
    let pipeline = build_pipeline(&config)?;

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &TracingSink,
    };
    let report = Dispatcher::new(config.workers)
        .run(&pipeline, &ids, &excluded, sink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Human => print_summary(&report),
    }
    Ok(())
}

fn run_targets(
    args: RunArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let mut config = apply_overrides(config, args.overrides);
    let ids = load_ids(&args.source, &mut config)?;
    let excluded = load_excluded(&args.source, &config)?;
    let completed = OutputStore::new(config.output_dir.clone()).completed_ids()?;
    let plan = plan_targets(&ids, &completed, &excluded);
    info!(
        total = plan.total,
        completed = plan.completed_before,
        excluded = plan.excluded,
        "resume filter applied"
    );

    match output_mode {
        OutputMode::Json => JsonOutput::print_targets(&plan.targets).into_diagnostic()?,
        OutputMode::Human => print_targets(&plan.targets),
    }
    Ok(())
}

fn run_single(
    args: ProcessArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let config = apply_overrides(config, args.overrides);
    let id = args.id.parse::<PdbId>()?;
    let pipeline = build_pipeline(&config)?;
    let outcome = pipeline.process(&id, &TracingSink);
    let done = outcome.is_done();
    let report = IdentifierReport { id, outcome };

    match output_mode {
        OutputMode::Json => {
            let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
            println!("{json}");
        }
        OutputMode::Human => print_outcome(&report),
    }
    if done {
        Ok(())
    } else {
        Err(miette::Report::msg(format!("{} was not processed", report.id)))
    }
}
