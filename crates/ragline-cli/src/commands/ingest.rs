//! Ingest command implementation.

use super::{get_paths, load_config, open_database};
use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use ragline_core::{ErrorStage, SourceKind};
use ragline_ingest::{discover, CancelFlag, IngestObserver, IngestionRun, RunReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::warn;

/// Command-line overrides for one ingest invocation.
#[derive(Debug, Default)]
pub struct IngestArgs {
    pub workers: Option<usize>,
    pub force_reindex: bool,
    pub dry_run: bool,
    pub report: Option<PathBuf>,
}

/// Drives the progress bar from worker events.
struct ProgressObserver {
    pb: ProgressBar,
}

impl ProgressObserver {
    fn new(pb: ProgressBar) -> Self {
        Self { pb }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl IngestObserver for ProgressObserver {
    fn on_file_started(&self, path: &Path) {
        self.pb.set_message(file_label(path));
    }

    fn on_file_duplicate(&self, _path: &Path, _doc_id: &str) {
        self.pb.inc(1);
    }

    fn on_file_reindex(&self, path: &Path, deleted_chunks: u64) {
        self.pb.println(format!(
            "  {} {} ({} old chunks removed)",
            "Reindex:".cyan(),
            file_label(path),
            deleted_chunks
        ));
    }

    fn on_rate_limit_retry(&self, path: &Path, attempt: u32, delay: Duration) {
        self.pb.println(format!(
            "  {} {} (attempt {}, waiting {:.1}s)",
            "Rate limited:".yellow(),
            file_label(path),
            attempt,
            delay.as_secs_f64()
        ));
    }

    fn on_file_completed(&self, path: &Path, chunks: usize, suspicious: bool) {
        if suspicious {
            self.pb.println(format!(
                "  {} {} ({} chunks)",
                "Suspicious:".yellow(),
                file_label(path),
                chunks
            ));
        }
        self.pb.inc(1);
    }

    fn on_file_error(&self, path: &Path, stage: ErrorStage, message: &str) {
        self.pb.println(format!(
            "  {} {} [{}]: {}",
            "Failed:".red(),
            file_label(path),
            stage,
            message
        ));
        self.pb.inc(1);
    }
}

/// Ingest a single file or directory.
pub fn run(path: &Path, args: IngestArgs) -> Result<()> {
    let mut config = load_config()?;
    if let Some(workers) = args.workers {
        config.ingest.workers = workers;
    }
    if args.force_reindex {
        config.ingest.force_reindex = true;
    }
    config.validate().context("Configuration is invalid")?;

    println!("{} {}", "Scanning:".cyan(), path.display());
    let files = discover(path).with_context(|| format!("Failed to scan {}", path.display()))?;

    if files.is_empty() {
        println!("{}", "No supported files found.".yellow());
        return Ok(());
    }

    println!("Found {} files", files.len());

    if args.dry_run {
        for file in &files {
            let kind = SourceKind::from_path(file)
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("  {} [{}]", file.display(), kind);
        }
        println!("\n{}", "Dry run - no files were ingested.".cyan());
        return Ok(());
    }

    let paths = get_paths(&config)?;
    paths.ensure_dirs().context("Failed to create directories")?;
    let db = open_database(&config, &paths)?;

    let runtime = Arc::new(Runtime::new().context("Failed to start async runtime")?);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let run = IngestionRun::from_config(&config, db, Arc::clone(&runtime))
        .context("Failed to set up ingestion")?
        .with_observer(Arc::new(ProgressObserver::new(pb.clone())));

    watch_ctrl_c(Arc::clone(&runtime), run.cancel_flag(), pb.clone());

    let report = run.execute(files);
    pb.finish_and_clear();

    save_reports(&report, &paths.reports_dir, args.report.as_deref());
    print_summary(&report);

    Ok(())
}

/// First Ctrl-C stops workers from taking new files; a second one exits.
fn watch_ctrl_c(runtime: Arc<Runtime>, cancel: CancelFlag, pb: ProgressBar) {
    let spawned = std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            if runtime.block_on(tokio::signal::ctrl_c()).is_err() {
                return;
            }
            pb.println(format!(
                "{} finishing files in progress (Ctrl-C again to abort)",
                "Interrupted:".yellow().bold()
            ));
            cancel.cancel();

            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                std::process::exit(130);
            }
        });
    if let Err(e) = spawned {
        warn!("Ctrl-C handling unavailable: {}", e);
    }
}

fn save_reports(report: &RunReport, reports_dir: &Path, extra: Option<&Path>) {
    let default_path = reports_dir.join(report.default_file_name());
    let targets = std::iter::once(default_path.as_path()).chain(extra);

    for target in targets {
        match report.write_json(target) {
            Ok(()) => println!("{} {}", "Report saved:".cyan(), target.display()),
            Err(e) => eprintln!(
                "{} could not write report to {}: {}",
                "Warning:".yellow().bold(),
                target.display(),
                e
            ),
        }
    }
}

fn print_summary(report: &RunReport) {
    let stats = &report.stats;

    println!();
    println!("{}", report);

    println!("{} {} files", "Ingested:".green().bold(), stats.files_processed);
    if stats.files_skipped > 0 {
        println!(
            "{} {} files (already ingested)",
            "Skipped:".yellow().bold(),
            stats.files_skipped
        );
    }
    if stats.files_failed > 0 {
        println!("{} {} files", "Failed:".red().bold(), stats.files_failed);
    }
    if stats.cancelled {
        println!(
            "{}",
            "Run was interrupted. Rerun the same command to resume.".yellow()
        );
    }
}
