//! Status command - show ledger statistics and recent errors.

use super::{format_size, get_database, load_config};
use anyhow::Result;
use colored::Colorize;
use ragline_core::DocumentStatus;

pub fn run(error_limit: i64) -> Result<()> {
    let config = load_config()?;
    let db = get_database(&config)?;
    let stats = db.get_stats()?;

    println!("{}", "Ragline Status".cyan().bold());
    println!("{}", "─".repeat(50));

    println!();
    println!("{}", "Ledger".white().bold());
    println!(
        "  Registered documents: {}",
        stats.documents_registered.to_string().green()
    );
    if stats.documents_partial > 0 {
        println!(
            "  Partially embedded documents: {} (missing chunks filled in on the next run)",
            stats.documents_partial.to_string().yellow()
        );
    }
    if stats.documents_processing > 0 {
        println!(
            "  Unfinished documents: {} (resumed on the next run)",
            stats.documents_processing.to_string().yellow()
        );
    }

    if !stats.documents_by_category.is_empty() {
        let mut categories: Vec<_> = stats.documents_by_category.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (category, count) in categories {
            println!("    {}: {}", category, count);
        }
    }

    println!();
    println!("{}", "Vector Store".white().bold());
    println!("  Chunks: {}", stats.total_chunks);
    println!("  Embeddings: {}", stats.total_embeddings);
    println!("  Model: {}", config.embedding.model);

    let unfinished = db.list_documents(Some(DocumentStatus::Processing), 5)?;
    if !unfinished.is_empty() {
        println!();
        println!("{}", "Unfinished".white().bold());
        for doc in &unfinished {
            println!("  {} {} (run {})", "◐".blue(), doc.file_name, doc.run_id);
        }
    }

    if !stats.errors_by_stage.is_empty() {
        println!();
        println!("{}", "Errors".white().bold());
        let mut stages: Vec<_> = stats.errors_by_stage.iter().collect();
        stages.sort();
        for (stage, count) in stages {
            println!("  {} {}: {}", "✗".red(), stage, count);
        }

        let recent = db.recent_ingestion_errors(error_limit)?;
        if !recent.is_empty() {
            println!();
            println!("{}", "Recent Errors".white().bold());
            for entry in &recent {
                println!(
                    "  {} [{}] {}: {}",
                    entry.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    entry.stage,
                    entry.file_path,
                    entry.message
                );
            }
        }
    }

    println!();
    println!("{}", "Storage".white().bold());
    println!("  Database size: {}", format_size(stats.database_size_bytes));

    Ok(())
}
