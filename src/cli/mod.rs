//! # CLI Module
//!
//! Command-line interface for the near-duplicate clustering engine.
//!
//! ## Usage
//! ```bash
//! # Cluster a finished probe run and write the report
//! photo-cluster --items items.ndjson --similarity run-similarity.ndjson --run run-run.json
//!
//! # Stricter clustering, keeping single items
//! photo-cluster --items items.ndjson --similarity sim.ndjson --run run.json --threshold 85 --includeSingles
//!
//! # Fingerprint items and write the similarity NDJSON + run descriptor
//! photo-cluster probe --items items.ndjson --out reports --fixtures ./fixtures
//! ```

use clap::{Args, Parser, Subcommand};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use photo_cluster::core::cluster::{ClusterOptions, DEFAULT_THRESHOLD, DEFAULT_TOP_PAIRS};
use photo_cluster::core::fetcher::{ContentFetcher, FetchConfig, FixtureFetcher, HttpFetcher};
use photo_cluster::core::ingest::read_items;
use photo_cluster::core::pipeline::Pipeline;
use photo_cluster::core::reporter::{generate_report, ReportRequest};
use photo_cluster::error::{ClusterEngineError, Result};
use photo_cluster::events::{Event, EventChannel, FingerprintEvent, PipelineEvent};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

const TOKEN_ENV: &str = "PHOTO_CLUSTER_ACCESS_TOKEN";

/// Photo Cluster - group near-duplicate photos for review
#[derive(Parser, Debug)]
#[command(name = "photo-cluster")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    report: ReportArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fingerprint items and write similarity pairs plus a run descriptor
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Items NDJSON
    #[arg(long, required = true)]
    items: Option<PathBuf>,

    /// Similarity NDJSON written by a probe
    #[arg(long, required = true)]
    similarity: Option<PathBuf>,

    /// Run descriptor JSON written by a probe
    #[arg(long, required = true)]
    run: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "reports")]
    out: PathBuf,

    /// Similarity percentage at or above which pairs are merged (0-100)
    #[arg(long, default_value_t = DEFAULT_THRESHOLD, value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: u8,

    /// Number of top-ranked pairs merged regardless of threshold
    #[arg(long = "topPairs", default_value_t = DEFAULT_TOP_PAIRS)]
    top_pairs: usize,

    /// Keep single-item clusters
    #[arg(long = "includeSingles")]
    include_singles: bool,

    /// Override the run id from the descriptor
    #[arg(long = "runId")]
    run_id: Option<String>,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Items NDJSON
    #[arg(long)]
    items: PathBuf,

    /// Output directory
    #[arg(long, default_value = "reports")]
    out: PathBuf,

    /// Run id (random when omitted)
    #[arg(long)]
    run_id: Option<String>,

    /// Bearer token for content downloads
    #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Near-match threshold recorded in the run descriptor (0-100)
    #[arg(long, default_value_t = DEFAULT_THRESHOLD, value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: u8,

    /// Serve item bytes from `<dir>/<id>.jpg|.jpeg|.png`
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Fail items without a fixture instead of downloading them
    #[arg(long, requires = "fixtures")]
    fixtures_strict: bool,

    /// Only download from these hosts (repeatable; `.example.com` matches sub-domains)
    #[arg(long = "allowed-host")]
    allowed_hosts: Vec<String>,

    /// Allow plain http and loopback/private download targets (local servers only)
    #[arg(long)]
    allow_local_targets: bool,

    /// Worker threads for fetching and hashing
    #[arg(long)]
    workers: Option<usize>,
}

/// Run the CLI
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let result = match cli.command {
        Some(Commands::Probe(args)) => run_probe(args),
        None => run_report(cli.report),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold().for_stderr(), e);
            ExitCode::FAILURE
        }
    }
}

fn required(value: Option<PathBuf>, flag: &str) -> Result<PathBuf> {
    value.ok_or_else(|| ClusterEngineError::InvalidArguments(format!("{} is required", flag)))
}

fn run_report(args: ReportArgs) -> Result<()> {
    let request = ReportRequest {
        items_path: required(args.items, "--items")?,
        similarity_path: required(args.similarity, "--similarity")?,
        run_path: required(args.run, "--run")?,
        out_dir: args.out,
        run_id: args.run_id,
        clustering: ClusterOptions::new()
            .threshold(args.threshold)
            .top_pairs(args.top_pairs)
            .include_singles(args.include_singles),
    };

    let (report, paths) = generate_report(&request)?;

    let term = Term::stderr();
    term.write_line(&format!(
        "{} {} clusters covering {} of {} items (threshold {}%, topPairs {})",
        style("✓").green().bold().for_stderr(),
        style(report.counters.clusters).cyan().for_stderr(),
        report.counters.clustered_items,
        report.counters.items,
        report.parameters.threshold,
        report.parameters.top_pairs
    ))
    .ok();
    if !report.failures.is_empty() {
        term.write_line(&format!(
            "  {} items failed during the probe",
            style(report.failures.len()).yellow().for_stderr()
        ))
        .ok();
    }

    println!("report: wrote {}", paths.report_dir.display());
    println!("clusters: wrote {}", paths.clusters_json.display());
    Ok(())
}

fn build_fetcher(args: &ProbeArgs) -> Result<Box<dyn ContentFetcher>> {
    let mut config = FetchConfig::new()
        .timeout(Duration::from_secs(args.timeout_secs))
        .allowed_hosts(args.allowed_hosts.clone())
        .allow_local_targets(args.allow_local_targets);
    if let Some(token) = &args.token {
        config = config.access_token(token.clone());
    }
    let http = HttpFetcher::new(config)?;

    Ok(match &args.fixtures {
        Some(dir) => Box::new(
            FixtureFetcher::new(dir)
                .strict(args.fixtures_strict)
                .fallback(Box::new(http)),
        ),
        None => Box::new(http),
    })
}

fn run_probe(args: ProbeArgs) -> Result<()> {
    let items = read_items(&args.items)?;
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut builder = Pipeline::builder()
        .fetcher(build_fetcher(&args)?)
        .threshold(args.threshold);
    if let Some(workers) = args.workers {
        builder = builder.workers(workers);
    }
    let pipeline = builder.build()?;

    let term = Term::stderr();
    let (sender, receiver) = EventChannel::new();

    // Only draw the bar on an interactive stderr
    let progress = if term.is_term() {
        let pb = ProgressBar::new(items.len() as u64);
        let bar_style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(bar_style);
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();

    // Handle events in a separate thread
    let event_thread = thread::spawn(move || {
        let mut failed = 0usize;
        for event in receiver.iter() {
            match event {
                Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_message(format!("{}", phase));
                    }
                }
                Event::Fingerprint(FingerprintEvent::Progress(p)) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_position(p.completed as u64);
                    }
                }
                Event::Fingerprint(FingerprintEvent::Failed(_)) => failed += 1,
                Event::Pipeline(PipelineEvent::Completed { .. }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.finish_and_clear();
                    }
                }
                _ => {}
            }
        }
        failed
    });

    let result = pipeline.run_to_dir(&items, &args.out, &run_id, &sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    let failed = event_thread.join().unwrap_or_default();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let (outcome, artifacts) = result?;

    term.write_line(&format!(
        "{} {} of {} items hashed, {} pairs evaluated",
        style("✓").green().bold().for_stderr(),
        style(outcome.summary.items_hashed).cyan().for_stderr(),
        outcome.summary.items_total,
        outcome.summary.pairs_evaluated
    ))
    .ok();
    if failed > 0 {
        term.write_line(&format!(
            "  {} items failed (see run descriptor)",
            style(failed).yellow().for_stderr()
        ))
        .ok();
    }

    println!("similarity: wrote {}", artifacts.similarity_path.display());
    println!("run: wrote {}", artifacts.run_path.display());
    Ok(())
}
