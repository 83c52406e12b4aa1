//! End-of-run summary.

use crate::error::IngestResult;
use crate::pool::RunStats;
use chrono::{DateTime, Utc};
use ragline_core::RunId;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Failed files listed in the text report.
const FAILED_FILES_SHOWN: usize = 10;

/// Result of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub files_discovered: usize,
    pub stats: RunStats,
    /// Requests in the limiter window when the run ended.
    pub window_requests: usize,
    /// Tokens in the limiter window when the run ended.
    pub window_tokens: u64,
    pub rpm_target: usize,
    pub tpm_target: u64,
    pub min_chunks_per_file: usize,
}

impl RunReport {
    pub fn average_chunks_per_file(&self) -> f64 {
        if self.stats.files_processed == 0 {
            0.0
        } else {
            self.stats.chunks_generated as f64 / self.stats.files_processed as f64
        }
    }

    /// `ingest_report_YYYYMMDD_HHMMSS.json`, from the run's start time.
    pub fn default_file_name(&self) -> String {
        format!("ingest_report_{}.json", self.started_at.format("%Y%m%d_%H%M%S"))
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> IngestResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn percent(used: f64, target: f64) -> f64 {
    if target <= 0.0 {
        0.0
    } else {
        used / target * 100.0
    }
}

fn format_elapsed(seconds: f64) -> String {
    let total = seconds.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{:.1}s", seconds)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats;
        writeln!(f, "Ingestion report (run {})", self.run_id)?;
        writeln!(f, "  Files discovered:    {}", self.files_discovered)?;
        writeln!(f, "  Files processed:     {}", stats.files_processed)?;
        writeln!(f, "  Files skipped:       {} (already ingested)", stats.files_skipped)?;
        writeln!(f, "  Files reindexed:     {}", stats.files_reindexed)?;
        writeln!(f, "  Files failed:        {}", stats.files_failed)?;
        writeln!(f, "  Chunks generated:    {}", stats.chunks_generated)?;
        writeln!(f, "  Chunks written:      {}", stats.chunks_written)?;
        writeln!(f, "  Avg chunks per file: {:.1}", self.average_chunks_per_file())?;
        if stats.failed_batches > 0 {
            writeln!(f, "  Failed batches:      {}", stats.failed_batches)?;
        }
        writeln!(f, "  Elapsed:             {}", format_elapsed(self.elapsed_seconds))?;
        writeln!(
            f,
            "  Rate usage (window): {} requests ({:.1}% of {}), {} tokens ({:.1}% of {})",
            self.window_requests,
            percent(self.window_requests as f64, self.rpm_target as f64),
            self.rpm_target,
            self.window_tokens,
            percent(self.window_tokens as f64, self.tpm_target as f64),
            self.tpm_target
        )?;
        if stats.cancelled {
            writeln!(f, "  Run was cancelled before all files were taken")?;
        }

        if !stats.suspicious_files.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "Suspicious files (fewer than {} chunks): {}",
                self.min_chunks_per_file,
                stats.suspicious_files.len()
            )?;
            for path in &stats.suspicious_files {
                writeln!(f, "  - {}", path)?;
            }
        }

        if !stats.failed_files.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "Failed files (showing {} of {}):",
                stats.failed_files.len().min(FAILED_FILES_SHOWN),
                stats.failed_files.len()
            )?;
            for failed in stats.failed_files.iter().take(FAILED_FILES_SHOWN) {
                writeln!(f, "  - {} [{}]: {}", failed.path, failed.stage, failed.message)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FailedFile;
    use chrono::TimeZone;
    use ragline_core::ErrorStage;

    fn report() -> RunReport {
        let started_at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let mut stats = RunStats {
            files_processed: 4,
            files_skipped: 1,
            chunks_generated: 50,
            chunks_written: 50,
            suspicious_files: vec!["/books/tiny.txt".into()],
            ..RunStats::default()
        };
        for i in 0..12 {
            stats.files_failed += 1;
            stats.failed_files.push(FailedFile {
                path: format!("/books/bad{}.pdf", i),
                stage: ErrorStage::Extraction,
                message: "no text".into(),
                at: started_at,
            });
        }

        RunReport {
            run_id: "run-1".into(),
            started_at,
            finished_at: started_at,
            elapsed_seconds: 83.0,
            files_discovered: 17,
            stats,
            window_requests: 285,
            window_tokens: 28_500,
            rpm_target: 2850,
            tpm_target: 2_850_000,
            min_chunks_per_file: 5,
        }
    }

    #[test]
    fn test_text_report() {
        let text = report().to_string();
        assert!(text.contains("Files processed:     4"));
        assert!(text.contains("Avg chunks per file: 12.5"));
        assert!(text.contains("Elapsed:             1m 23s"));
        assert!(text.contains("285 requests (10.0% of 2850)"));
        assert!(text.contains("28500 tokens (1.0% of 2850000)"));
        assert!(text.contains("/books/tiny.txt"));
        assert!(text.contains("showing 10 of 12"));
        assert!(text.contains("/books/bad9.pdf [extraction]: no text"));
        assert!(!text.contains("/books/bad10.pdf"));
    }

    #[test]
    fn test_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = report();
        assert_eq!(report.default_file_name(), "ingest_report_20240309_140507.json");

        let path = dir.path().join("reports").join(report.default_file_name());
        report.write_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["stats"]["files_processed"], 4);
        assert_eq!(value["stats"]["failed_files"][0]["stage"], "extraction");
        assert_eq!(value["rpm_target"], 2850);
    }
}
