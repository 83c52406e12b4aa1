//! Configuration commands.

use super::{get_paths, load_config};
use anyhow::{Context, Result};
use colored::Colorize;
use ragline_config::AppPaths;

pub fn show() -> Result<()> {
    let config = load_config()?;
    let paths = get_paths(&config)?;

    let contents = config
        .to_toml_string()
        .context("Failed to render configuration")?;

    println!("{}", "Effective Configuration".cyan().bold());
    if paths.config_file.exists() {
        println!("{}", format!("# from {}", paths.config_file.display()).dimmed());
    } else {
        println!("{}", "# defaults (no config file yet)".dimmed());
    }
    println!("{}", "─".repeat(50));
    println!("{}", contents);

    Ok(())
}

pub fn path() -> Result<()> {
    let paths = AppPaths::new().context("Failed to determine application directories")?;
    println!("{}", paths.config_file.display());
    Ok(())
}

pub fn validate() -> Result<()> {
    let config = load_config()?;
    config.validate().context("Configuration is invalid")?;

    println!("{} Configuration is valid.", "✓".green());
    println!(
        "  Targets: {} RPM / {} TPM",
        config.rate_limit.rpm_target, config.rate_limit.tpm_target
    );
    Ok(())
}
