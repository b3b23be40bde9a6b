//! abmux - turn a folder of audio tracks into tagged audiobook files.
//!
//! Collects the book metadata from flags (or a JSON file), probes MP4Box
//! and AtomicParsley, then runs every file through demux, remux and tag.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};

use abmux_core::config::{ConfigManager, FailurePolicy, ToolSettings};
use abmux_core::discovery::{build_jobs, discover_sources, DEFAULT_EXTENSIONS};
use abmux_core::logging::{init_tracing, LogLevel};
use abmux_core::models::{BookMetadata, ErrorKind, JobState};
use abmux_core::orchestrator::{PipelineEvent, QueueProcessor, ToolPaths};
use abmux_core::paths::PathResolver;
use abmux_core::probe::ToolProbe;

/// Convert a folder of single-track audio files into tagged audiobook files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder containing the book's audio files.
    folder: String,

    /// JSON file with book metadata. Flags override its values.
    #[arg(short, long)]
    metadata: Option<String>,

    /// Book title (defaults to the folder name).
    #[arg(short, long)]
    title: Option<String>,

    /// Author; repeat for several.
    #[arg(short, long = "author")]
    authors: Vec<String>,

    /// Narrator; repeat for several.
    #[arg(short, long = "narrator")]
    narrators: Vec<String>,

    /// Series title, used as the album.
    #[arg(long)]
    series: Option<String>,

    /// Position in the series, used as the disk number.
    #[arg(long)]
    series_number: Option<u32>,

    /// Publication date or year.
    #[arg(long)]
    date: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    copyright: Option<String>,

    /// Cover image embedded as artwork.
    #[arg(long)]
    cover: Option<String>,

    /// Settings file (defaults to the per-user config location).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop at the first failed file instead of continuing.
    #[arg(long)]
    halt_on_failure: bool,

    /// More output (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = ConfigManager::new(args.config.clone().unwrap_or_else(ConfigManager::default_path));
    config
        .load_or_create()
        .with_context(|| format!("Failed to load configuration {}", config.path().display()))?;

    let level = match args.verbose {
        0 => config.settings().logging.level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    init_tracing(level);
    tracing::debug!("Using config {}", config.path().display());

    let mut settings = config.settings().clone();
    if args.halt_on_failure {
        settings.queue.on_failure = FailurePolicy::Halt;
    }

    let resolver = PathResolver::new();
    let folder = resolver.normalize(&args.folder);
    let book = load_book(&args, &resolver, &folder)?;

    let sources = discover_sources(&folder, DEFAULT_EXTENSIONS, &settings.mux.container_extension)?;
    if sources.is_empty() {
        bail!("No audio files found in {}", folder.display());
    }
    let jobs = build_jobs(&sources, &book, &settings.mux);

    let tools = ToolPaths::resolve(&resolver, &settings.tools);
    check_tools(&tools, &settings.tools).await?;

    let log_dir = folder.join(resolver.normalize(&config.logs_folder().to_string_lossy()));
    println!(
        "{}: {} file(s), logs in {}",
        book.title,
        jobs.len(),
        log_dir.display()
    );

    let mut handle = QueueProcessor::new(settings, tools, log_dir).start(jobs);

    let token = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, stopping...");
            token.cancel();
        }
    });

    let verbose = args.verbose > 0;
    while let Some(event) = handle.next_event().await {
        print_event(&event, verbose);
    }

    let report = handle.wait().await?;
    println!(
        "\n{} done, {} failed, {} cancelled, {} not started",
        report.succeeded(),
        report.failed(),
        report.cancelled(),
        report.skipped()
    );

    Ok(if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Metadata from the optional JSON file, overridden by flags.
fn load_book(args: &Args, resolver: &PathResolver, folder: &Path) -> Result<BookMetadata> {
    let mut book = match &args.metadata {
        Some(raw) => {
            let path = resolver.normalize(raw);
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid metadata in {}", path.display()))?
        }
        None => BookMetadata::default(),
    };

    if let Some(title) = &args.title {
        book.title = title.clone();
    }
    if !args.authors.is_empty() {
        book.authors = args.authors.clone();
    }
    if !args.narrators.is_empty() {
        book.narrators = args.narrators.clone();
    }
    if args.series.is_some() {
        book.series_title = args.series.clone();
    }
    if args.series_number.is_some() {
        book.series_number = args.series_number;
    }
    if let Some(date) = &args.date {
        book.date = date.clone();
    }
    if let Some(description) = &args.description {
        book.description = description.clone();
    }
    if let Some(copyright) = &args.copyright {
        book.copyright = copyright.clone();
    }
    if let Some(cover) = &args.cover {
        book.cover = Some(resolver.normalize(cover));
    }

    if book.title.trim().is_empty() {
        book.title = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Audiobook".to_string());
    }
    Ok(book)
}

/// Probe both tools. Missing tools abort; unhealthy ones only warn.
async fn check_tools(tools: &ToolPaths, settings: &ToolSettings) -> Result<()> {
    let probe = ToolProbe::new(Duration::from_millis(settings.probe_timeout_ms));
    let checks = [
        (&tools.mp4box, &settings.mp4box_probe_args),
        (&tools.atomicparsley, &settings.atomicparsley_probe_args),
    ];

    for (binary, probe_args) in checks {
        let status = probe.probe(binary, probe_args).await;
        let Some(error) = status.to_error(binary) else {
            continue;
        };
        match error.kind {
            ErrorKind::BinaryUnavailable => bail!("{}", error.message),
            _ => {
                tracing::warn!("{}", error.message);
                eprintln!("warning: {} (continuing)", error.message);
            }
        }
    }
    Ok(())
}

fn print_event(event: &PipelineEvent, verbose: bool) {
    match event {
        PipelineEvent::Progress {
            job_id,
            stage,
            percent,
            message,
        } => {
            let note = message.as_deref().unwrap_or("");
            print!("\r[{}] {:<5} {:>3}% {:<30}", job_id, stage.name(), percent, note);
            let _ = std::io::stdout().flush();
        }
        PipelineEvent::Log { line, .. } => {
            if verbose {
                println!("\n{}", line);
            }
        }
        PipelineEvent::Finished {
            job_id,
            state,
            error,
            output,
        } => match (state, error, output) {
            (JobState::Done, _, Some(path)) => println!("\n[{}] done: {}", job_id, path.display()),
            (_, Some(error), _) => println!("\n[{}] {}: {}", job_id, state, error.message),
            _ => println!("\n[{}] {}", job_id, state),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "abmux",
            "/books/Dune",
            "-a",
            "Frank Herbert",
            "-n",
            "Scott Brick",
            "-n",
            "Orlagh Cassidy",
            "--series-number",
            "1",
        ]);
        let book = load_book(&args, &PathResolver::new(), Path::new("/books/Dune")).unwrap();

        assert_eq!(book.title, "Dune");
        assert_eq!(book.authors, ["Frank Herbert"]);
        assert_eq!(book.narrators.len(), 2);
        assert_eq!(book.series_number, Some(1));
    }
}
