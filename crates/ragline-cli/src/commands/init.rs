//! Initialize ragline.

use super::{get_paths, load_config, open_database};
use anyhow::{Context, Result};
use colored::Colorize;
use ragline_config::Config;

pub fn run() -> Result<()> {
    let config = load_config()?;
    let paths = get_paths(&config)?;

    if paths.is_initialized() {
        println!("{} Ragline is already initialized.", "Note:".yellow().bold());
        println!("  Config: {}", paths.config_file.display());
        println!("  Database: {}", paths.database_file.display());
        return Ok(());
    }

    println!("{}", "Initializing ragline...".cyan().bold());

    paths.ensure_dirs().context("Failed to create directories")?;
    println!("  {} Created directories", "✓".green());

    if !paths.config_file.exists() {
        Config::create_default_file(&paths.config_file).context("Failed to create config file")?;
        println!("  {} Created config: {}", "✓".green(), paths.config_file.display());
    }

    let _db = open_database(&config, &paths)?;
    println!("  {} Created database: {}", "✓".green(), paths.database_file.display());

    println!();
    println!("{}", "Ragline initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  1. Set your API key: {}",
        format!("export {}=...", config.embedding.api_key_env).cyan()
    );
    println!("  2. Ingest a library: {}", "ragline ingest ~/Books".cyan());
    println!("  3. Check status: {}", "ragline status".cyan());

    Ok(())
}
