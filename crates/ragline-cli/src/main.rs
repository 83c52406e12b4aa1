//! Ragline CLI - Concurrent document ingestion for retrieval-augmented chat

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use ragline_config::Config;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ragline - ingest a document library into a vector store
#[derive(Parser)]
#[command(name = "ragline")]
#[command(version)]
#[command(about = "Concurrent document ingestion for retrieval-augmented chat", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize ragline (create config and ledger database)
    Init,

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Show ledger statistics and recent errors
    Status {
        /// Number of recent errors to show
        #[arg(short, long, default_value = "10")]
        errors: i64,
    },

    /// Ingest a file or directory into the vector store
    Ingest {
        /// Path to a document or a directory of documents
        path: PathBuf,

        /// Number of worker threads (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Delete and reingest documents that are already registered
        #[arg(long)]
        force_reindex: bool,

        /// List the files that would be ingested without processing them
        #[arg(long)]
        dry_run: bool,

        /// Also write the JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Check the configuration for invalid values
    Validate,
}

fn init_logging(verbose: bool, log_file: Option<&Path>) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragline=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragline=info,warn"))
    };

    let file_layer = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!(
                "{} cannot write log file {}: {}",
                "Warning:".yellow().bold(),
                path.display(),
                e
            );
            None
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();
}

/// Open the log file for appending, creating its directory if needed.
fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn main() {
    // API keys and RAGLINE_* overrides may live in a local .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Config errors are reported by the command itself
    let log_file = Config::load()
        .ok()
        .and_then(|config| config.log_file_path().ok().flatten());
    init_logging(cli.verbose, log_file.as_deref());

    let result = match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(),
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Validate => commands::config::validate(),
        },
        Commands::Status { errors } => commands::status::run(errors),
        Commands::Ingest {
            path,
            workers,
            force_reindex,
            dry_run,
            report,
        } => commands::ingest::run(
            &path,
            commands::ingest::IngestArgs {
                workers,
                force_reindex,
                dry_run,
                report,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest_flags() {
        let cli = Cli::try_parse_from([
            "ragline",
            "ingest",
            "/books",
            "--workers",
            "8",
            "--force-reindex",
            "--report",
            "out.json",
        ])
        .unwrap();

        match cli.command {
            Commands::Ingest {
                path,
                workers,
                force_reindex,
                dry_run,
                report,
            } => {
                assert_eq!(path, PathBuf::from("/books"));
                assert_eq!(workers, Some(8));
                assert!(force_reindex);
                assert!(!dry_run);
                assert_eq!(report, Some(PathBuf::from("out.json")));
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["ragline", "status", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Status { errors: 10 }));
    }

    #[test]
    fn test_log_file_is_appended() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("ragline.log");

        writeln!(open_log_file(&path).unwrap(), "first run").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second run").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first run\nsecond run\n");
    }

    #[test]
    fn test_ingest_requires_path() {
        assert!(Cli::try_parse_from(["ragline", "ingest"]).is_err());
    }
}
