//! CLI entry point for the M4B assembler
//!
//! Scans folders, plans batches and runs them, reporting batch events
//! through `tracing`.

use clap::{Args, Parser, Subcommand};
use m4b_assembler::{
    extract_cover, load_batch, probe_track, run_startup_checks, save_batch, scan_folder,
    AssembleOptions, BatchEvent, BatchExecutor, BookMetadata, Config, CoverArt, EventSink, Job,
    JobBuildError, JobOutcome, Toolchain,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

/// Config file used when `--config` is not given. Optional.
const DEFAULT_CONFIG_FILE: &str = "m4b-assembler.toml";

/// M4B Assembler - build chaptered audiobooks from folders of audio tracks
#[derive(Parser, Debug)]
#[command(name = "m4b-assembler")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Skip the ffmpeg/ffprobe availability checks
    #[arg(long, global = true)]
    skip_checks: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the audio files of a folder in chapter order
    Scan {
        dir: PathBuf,
        #[arg(short, long)]
        recursive: bool,
    },

    /// Probe one audio file and print the result as JSON
    Probe { file: PathBuf },

    /// Extract the embedded picture of an audio file
    ExtractCover { source: PathBuf, dest: PathBuf },

    /// Scan folders and write a batch file for review
    Plan {
        #[command(flatten)]
        folders: FolderArgs,

        /// Batch file to write
        #[arg(long)]
        out: PathBuf,
    },

    /// Scan folders and assemble them right away
    Assemble {
        #[command(flatten)]
        folders: FolderArgs,

        /// Re-encode audio to AAC instead of stream-copying
        #[arg(long)]
        reencode: bool,

        /// Cover image used for every assembled book
        #[arg(long)]
        cover: Option<PathBuf>,
    },

    /// Assemble every job of a batch file
    Run {
        batch: PathBuf,

        /// Re-encode audio to AAC instead of stream-copying
        #[arg(long)]
        reencode: bool,
    },
}

#[derive(Args, Debug)]
struct FolderArgs {
    /// Folders to turn into audiobooks, one book per folder
    #[arg(required = true)]
    dirs: Vec<PathBuf>,

    /// Include audio files in subfolders
    #[arg(short, long)]
    recursive: bool,

    /// Write outputs here instead of next to each folder
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Author applied to every book
    #[arg(long)]
    author: Option<String>,

    /// Year applied to every book
    #[arg(long)]
    year: Option<String>,

    /// Genre applied to every book
    #[arg(long)]
    genre: Option<String>,
}

impl FolderArgs {
    fn shared_metadata(&self) -> BookMetadata {
        BookMetadata {
            author: self.author.clone(),
            year: self.year.clone(),
            genre: self.genre.clone(),
            ..Default::default()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "m4b_assembler=debug"
    } else {
        "m4b_assembler=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    match path {
        Some(path) => Config::load(path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e)),
        None => Config::load_or_default(DEFAULT_CONFIG_FILE)
            .map_err(|e| format!("Failed to load {}: {}", DEFAULT_CONFIG_FILE, e)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let tools = Toolchain::from_config(&config.tools);

    let needs_tools = !matches!(cli.command, Command::Scan { .. });
    if needs_tools {
        if cli.skip_checks {
            warn!("skipping startup checks (--skip-checks enabled)");
        } else if let Err(e) = run_startup_checks(&tools) {
            eprintln!("Startup check failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let result = match cli.command {
        Command::Scan { dir, recursive } => {
            scan(&dir, recursive || config.scan.recursive);
            Ok(true)
        }
        Command::Probe { file } => probe(&tools, &file),
        Command::ExtractCover { source, dest } => extract_cover(&tools, &source, &dest)
            .map(|()| {
                println!("Cover written to {}", dest.display());
                true
            })
            .map_err(|e| format!("Cover extraction failed: {}", e)),
        Command::Plan { folders, out } => plan(&config, &tools, folders, &out).await,
        Command::Assemble {
            folders,
            reencode,
            cover,
        } => match build_jobs(&config, &tools, &folders).await {
            Ok(mut jobs) => {
                if let Some(cover) = cover {
                    for job in &mut jobs {
                        job.cover = CoverArt::File {
                            path: cover.clone(),
                        };
                    }
                }
                Ok(run_batch(&config, tools, jobs, reencode).await)
            }
            Err(e) => Err(e),
        },
        Command::Run { batch, reencode } => match load_batch(&batch) {
            Ok(jobs) => Ok(run_batch(&config, tools, jobs, reencode).await),
            Err(e) => Err(format!("Failed to read batch {}: {}", batch.display(), e)),
        },
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn scan(dir: &Path, recursive: bool) {
    let files = scan_folder(dir, recursive);
    if files.is_empty() {
        warn!(folder = %dir.display(), "no audio files found");
    }
    for file in files {
        println!("{}", file.display());
    }
}

fn probe(tools: &Toolchain, file: &Path) -> Result<bool, String> {
    let probe = probe_track(tools, file);
    let json = serde_json::to_string_pretty(&probe)
        .map_err(|e| format!("Failed to serialize probe result: {}", e))?;
    println!("{}", json);
    Ok(true)
}

/// Build one job per folder. Folders without audio are skipped with a warning.
async fn build_jobs(
    config: &Config,
    tools: &Toolchain,
    folders: &FolderArgs,
) -> Result<Vec<Job>, String> {
    let dirs = folders.dirs.clone();
    let recursive = folders.recursive || config.scan.recursive;
    let output_dir = folders
        .output_dir
        .clone()
        .or_else(|| config.output.output_dir.clone());
    let extension = config.output.extension.clone();
    let shared = folders.shared_metadata();
    let tools = tools.clone();

    let jobs = tokio::task::spawn_blocking(move || {
        let mut jobs = Vec::new();
        for dir in &dirs {
            match Job::from_folder(dir, recursive, &tools, output_dir.as_deref(), &extension) {
                Ok(mut job) => {
                    job.apply_shared_metadata(&shared);
                    info!(
                        job = %job.name,
                        tracks = job.tracks.len(),
                        output = %job.output_path.display(),
                        "planned job"
                    );
                    jobs.push(job);
                }
                Err(JobBuildError::NoAudioFiles(dir)) => {
                    warn!(folder = %dir.display(), "no audio files found, skipping folder");
                }
            }
        }
        jobs
    })
    .await
    .map_err(|e| format!("Folder scan failed: {}", e))?;

    if jobs.is_empty() {
        return Err("No audio files found in any of the given folders".to_string());
    }
    Ok(jobs)
}

async fn plan(
    config: &Config,
    tools: &Toolchain,
    folders: FolderArgs,
    out: &Path,
) -> Result<bool, String> {
    let jobs = build_jobs(config, tools, &folders).await?;
    save_batch(out, &jobs).map_err(|e| format!("Failed to write batch {}: {}", out.display(), e))?;
    println!("Wrote {} job(s) to {}", jobs.len(), out.display());
    Ok(true)
}

/// Run a batch to completion. Returns whether every job succeeded.
async fn run_batch(config: &Config, tools: Toolchain, jobs: Vec<Job>, reencode: bool) -> bool {
    let mut options = AssembleOptions::from(&config.output);
    if reencode {
        options.copy_audio = false;
    }

    let (events, rx) = EventSink::channel();
    let reporter = tokio::spawn(report_events(rx));

    let executor = BatchExecutor::new(tools, options, events);
    let summary = executor.run(jobs).await;
    // Closes the event channel so the reporter can finish.
    drop(executor);
    let _ = reporter.await;

    summary.all_succeeded()
}

async fn report_events(mut rx: UnboundedReceiver<BatchEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            BatchEvent::Progress {
                percent,
                job_index,
                total,
            } => info!(percent, job = job_index, total, "progress"),
            BatchEvent::Log { message, .. } => info!("{}", message),
            BatchEvent::JobFinished { name, outcome, .. } => match outcome {
                JobOutcome::Succeeded { output_path } => {
                    info!(job = %name, output = %output_path.display(), "done")
                }
                JobOutcome::Failed { error: detail } => error!(job = %name, "failed: {}", detail),
            },
            BatchEvent::Summary {
                total,
                succeeded,
                failed,
            } => info!(total, succeeded, failed, "batch complete"),
        }
    }
}
