use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use taxid2prot::app::{
    BatchPlan, ItemOutcome, OrganismLookup, ProgressSink, RunOptions, RunReport, run_parallel,
};
use taxid2prot::batch::available_workers;
use taxid2prot::config::{Config, ConfigLoader, ResolvedConfig};
use taxid2prot::domain::{Source, Strategy, TaxonomyId};
use taxid2prot::error::FetchError;
use taxid2prot::fetch::{HttpOptions, RetryPolicy};
use taxid2prot::ncbi::NcbiProteomeClient;
use taxid2prot::output::{ConsoleSink, JsonOutput, OutputMode};
use taxid2prot::session::SessionOptions;
use taxid2prot::uniprot::UniprotProteomeClient;

#[derive(Parser)]
#[command(name = "taxid2prot")]
#[command(about = "Download protein FASTA sets by taxonomy id and name them by organism")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON on stdout instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch proteomes for taxonomy ids")]
    Fetch(FetchArgs),
    #[command(about = "Show how ids would be split over workers")]
    Split(SplitArgs),
    #[command(about = "Print the organism name found in a FASTA file")]
    Organism(OrganismArgs),
}

#[derive(Args)]
struct FetchArgs {
    tax_ids: Vec<String>,

    #[arg(long)]
    config: Option<String>,

    /// Base directory; a fresh proteins(<i>) folder is created inside it.
    #[arg(long)]
    out: Option<Utf8PathBuf>,

    #[arg(long, value_enum)]
    source: Option<Source>,

    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Export strategy: wait for pending downloads after this many submissions.
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long)]
    retries: Option<usize>,

    #[arg(long)]
    user_agent: Option<String>,
}

#[derive(Args)]
struct SplitArgs {
    tax_ids: Vec<String>,

    #[arg(long)]
    chunks: Option<usize>,
}

#[derive(Args)]
struct OrganismArgs {
    file: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<FetchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FetchError) -> u8 {
    if error.is_configuration() {
        2
    } else if error.is_remote() {
        3
    } else {
        1
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, output_mode),
        Commands::Split(args) => run_split(args),
        Commands::Organism(args) => run_organism(args, output_mode),
    }
}

fn parse_tax_ids(values: &[String]) -> Result<Vec<TaxonomyId>, FetchError> {
    values.iter().map(|value| value.parse()).collect()
}

fn load_config(path: Option<&str>, has_cli_ids: bool) -> Result<ResolvedConfig, FetchError> {
    match ConfigLoader::resolve(path) {
        Err(FetchError::MissingConfig) if has_cli_ids => ConfigLoader::resolve_config(Config::default()),
        other => other,
    }
}

fn run_fetch(args: FetchArgs, output_mode: OutputMode) -> miette::Result<()> {
    let cli_ids = parse_tax_ids(&args.tax_ids)?;
    let mut resolved = load_config(args.config.as_deref(), !cli_ids.is_empty())?;
    if !cli_ids.is_empty() {
        resolved.taxa = cli_ids;
    }
    if resolved.taxa.is_empty() {
        return Err(FetchError::NoTaxonomyIds.into());
    }

    let source = args.source.unwrap_or(resolved.source);
    let mut options = RunOptions::new(args.out.unwrap_or(resolved.out));
    options.session = SessionOptions {
        source,
        user_agent: args.user_agent.or(resolved.user_agent),
    };
    options.strategy = args.strategy.unwrap_or(resolved.strategy);
    options.batch_size = args.batch_size.unwrap_or(resolved.batch_size);
    options.poll = resolved.poll;
    options.workers = args
        .workers
        .or(resolved.workers)
        .unwrap_or_else(available_workers);

    let http = HttpOptions {
        timeout: args
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(resolved.timeout),
        retry: RetryPolicy {
            max_retries: args.retries.unwrap_or(resolved.retries),
            ..RetryPolicy::default()
        },
    };

    let console = ConsoleSink::new();
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::NonInteractive => &JsonOutput,
        OutputMode::Interactive => &console,
    };

    let taxa = &resolved.taxa;
    let results = match source {
        Source::Uniprot => {
            run_parallel(&options, taxa, || UniprotProteomeClient::new(&http), sink)?
        }
        Source::Ncbi => run_parallel(&options, taxa, || NcbiProteomeClient::new(&http), sink)?,
    };

    let mut reports = Vec::with_capacity(results.len());
    let mut first_error = None;
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_reports(&reports).into_diagnostic()?,
        OutputMode::Interactive => print_fetch_summary(&reports),
    }
    match first_error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn run_split(args: SplitArgs) -> miette::Result<()> {
    let tax_ids = parse_tax_ids(&args.tax_ids)?;
    let chunks = args.chunks.unwrap_or_else(available_workers);
    JsonOutput::print_batches(&BatchPlan::new(&tax_ids, chunks)).into_diagnostic()
}

fn run_organism(args: OrganismArgs, output_mode: OutputMode) -> miette::Result<()> {
    let lookup = OrganismLookup::from_file(&args.file)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_organism(&lookup).into_diagnostic(),
        OutputMode::Interactive => {
            println!("{}", lookup.organism);
            Ok(())
        }
    }
}

fn print_fetch_summary(reports: &[RunReport]) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}📦 taxid2prot summary{reset}");
    let stored: usize = reports.iter().map(RunReport::stored).sum();
    let failed: usize = reports
        .iter()
        .map(|report| report.count(ItemOutcome::Failed))
        .sum();
    println!("{green}✅ Stored files: {stored}{reset}");
    println!("{yellow}⚠️ Failed: {failed}{reset}");

    for report in reports {
        println!(
            "{cyan}📁 {} ({}, {}){reset}",
            report.directory, report.source, report.strategy
        );
        for item in &report.items {
            let (icon, color) = match item.outcome {
                ItemOutcome::Saved | ItemOutcome::Renamed => ("⬇️", green),
                ItemOutcome::Failed => ("✖", red),
                _ => ("•", yellow),
            };
            let tax_id = item
                .tax_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{color}{icon} {tax_id} ({}){reset}", item.outcome.as_str());
            if let Some(path) = &item.path {
                println!("{color}   {path}{reset}");
            }
            if let Some(message) = &item.message {
                println!("{color}   {message}{reset}");
            }
        }
    }
}
