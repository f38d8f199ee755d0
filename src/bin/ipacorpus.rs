use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use ipacorpus::downloader::run_download;
use ipacorpus::exporter::export_manifest;
use ipacorpus::logging;
use ipacorpus::metadata::run_metadata;
use ipacorpus::opts::Opts;
use ipacorpus::output_type::ManifestFormat;
use ipacorpus::records::{SegmentMethod, language_code};
use ipacorpus::segmenter::run_segment;
use ipacorpus::store::Store;
use ipacorpus::summary::RunSummary;

#[derive(Parser, Debug)]
#[command(name = "ipacorpus")]
#[command(about = "Build an IPA-labelled word-level speech corpus from the UCLA phonetics archive")]
struct Cli {
    /// TOML config file; flags below override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root for audio, clips, the store and the manifest.
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Store location (default `{data_root}/db/ipacorpus.db`).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape languages, recordings and word-list entries.
    Metadata {
        #[command(flatten)]
        scope: Scope,

        /// Seconds between page requests.
        #[arg(long)]
        delay: Option<f64>,
    },

    /// Download recording audio.
    Download {
        #[command(flatten)]
        scope: Scope,

        /// Seconds between requests of one worker.
        #[arg(long)]
        delay: Option<f64>,

        #[arg(long)]
        workers: Option<usize>,

        /// Also fetch sentence, story and other non-word-list recordings.
        #[arg(long, default_value_t = false)]
        all_kinds: bool,
    },

    /// Split downloaded word lists into per-entry clips.
    Segment {
        #[command(flatten)]
        scope: Scope,

        #[arg(long)]
        workers: Option<usize>,

        /// `reference` or `ffmpeg`.
        #[arg(long)]
        backend: Option<SegmentMethod>,

        /// Re-segment recordings that already have clips.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Accepted distance between span count and entry count.
        #[arg(long)]
        tolerance: Option<u32>,
    },

    /// Write the corpus manifest.
    Export {
        #[command(flatten)]
        scope: Scope,

        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum)]
        format: Option<ManifestFormat>,
    },

    /// Print row counts from the store.
    Stats {
        #[command(flatten)]
        scope: Scope,
    },
}

#[derive(Args, Debug)]
struct Scope {
    /// Restrict to one language code.
    #[arg(long)]
    language: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "ipacorpus failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut opts = match &cli.config {
        Some(path) => Opts::load(path)?,
        None => Opts::default(),
    };
    if let Some(root) = cli.data_root {
        opts.data_root = root;
    }
    if let Some(db) = cli.db {
        opts.db_path = Some(db);
    }

    match cli.command {
        Command::Metadata { scope, delay } => {
            if let Some(delay) = delay {
                opts.metadata.delay_secs = delay;
            }
            opts.validate()?;
            report(run_metadata(&opts, scope.language.as_deref())?);
        }
        Command::Download {
            scope,
            delay,
            workers,
            all_kinds,
        } => {
            if let Some(delay) = delay {
                opts.download.delay_secs = delay;
            }
            if let Some(workers) = workers {
                opts.download.workers = workers;
            }
            opts.download.all_kinds |= all_kinds;
            opts.validate()?;
            report(run_download(&opts, scope.language.as_deref())?);
        }
        Command::Segment {
            scope,
            workers,
            backend,
            force,
            tolerance,
        } => {
            if let Some(workers) = workers {
                opts.segment.workers = workers;
            }
            if let Some(backend) = backend {
                opts.segment.backend = backend;
            }
            if let Some(tolerance) = tolerance {
                opts.segment.tolerance = tolerance;
            }
            opts.segment.force |= force;
            opts.validate()?;
            report(run_segment(&opts, scope.language.as_deref())?);
        }
        Command::Export {
            scope,
            output,
            format,
        } => {
            if output.is_some() {
                opts.export.output = output;
            }
            if let Some(format) = format {
                opts.export.format = format;
            }
            opts.validate()?;
            let report = export_manifest(&opts, scope.language.as_deref())?;
            println!(
                "wrote {} records to {} ({} segmented, {} fallback)",
                report.records,
                report.path.display(),
                report.segmented,
                report.fallback
            );
        }
        Command::Stats { scope } => {
            opts.validate()?;
            let db = opts.db_path();
            let store = Store::open(&db)
                .with_context(|| format!("cannot open store {}", db.display()))?;
            let code = scope.language.as_deref().map(language_code);
            println!("{}", store.stats(code.as_deref())?);
        }
    }
    Ok(())
}

fn report(summary: RunSummary) {
    println!("{}: {summary}", summary.phase());
    for failure in summary.failures() {
        println!("  {}: {}", failure.unit, failure.reason);
    }
}
