//! CLI command implementations.

pub mod config;
pub mod ingest;
pub mod init;
pub mod status;

use anyhow::{Context, Result};
use ragline_config::{AppPaths, Config};
use ragline_db::Database;
use std::time::Duration;

/// Load the configuration with `RAGLINE_*` overrides applied.
pub fn load_config() -> Result<Config> {
    Config::load().context("Failed to load configuration")
}

/// Resolve application paths for a loaded configuration.
pub fn get_paths(config: &Config) -> Result<AppPaths> {
    config
        .paths()
        .context("Failed to determine application directories")
}

/// Open the ledger database using the configured busy timeout.
pub fn open_database(config: &Config, paths: &AppPaths) -> Result<Database> {
    let timeout = Duration::from_secs(config.general.db_timeout_seconds);
    Database::open_with_timeout(&paths.database_file, timeout).with_context(|| {
        format!(
            "Failed to open ledger database at {}",
            paths.database_file.display()
        )
    })
}

/// Get a database connection, ensuring ragline is initialized.
pub fn get_database(config: &Config) -> Result<Database> {
    let paths = get_paths(config)?;

    if !paths.is_initialized() {
        anyhow::bail!("Ragline is not initialized. Run 'ragline init' first.");
    }

    open_database(config, &paths)
}

/// Format a file size in human-readable form.
pub fn format_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
