//! Markdown run summary
//!
//! This module renders a finished crawl as a human-readable markdown report:
//! run metadata, overall counts, discovery errors and the outcome of every
//! extraction.

use crate::crawler::CrawlReport;
use crate::extract::ExtractionOutcome;
use crate::output::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Discovery errors listed before the rest is elided
const MAX_LISTED_ERRORS: usize = 50;

/// Writes the markdown summary of `report` to `output_path`
///
/// Parent directories are created as needed.
///
/// # Arguments
///
/// * `report` - The finished crawl
/// * `output_path` - Path where the markdown file should be written
pub fn write_markdown_summary(report: &CrawlReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(report);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl report as markdown
pub fn format_markdown_summary(report: &CrawlReport) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Glean Run Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Base URL**: {}\n", report.base_url));
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", report.finished_at.to_rfc3339()));
    let seconds = report.duration().num_milliseconds() as f64 / 1000.0;
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds ({:.2} minutes)\n",
        seconds,
        seconds / 60.0
    ));
    if let Some(hash) = &report.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Pages Discovered | {} |\n", report.links.len()));
    md.push_str(&format!("| Discovery Errors | {} |\n", report.discovery_errors.len()));
    md.push_str(&format!("| Texts Accepted | {} |\n", report.accepted_count()));
    md.push_str(&format!("| Texts Rejected | {} |\n", report.rejected_count()));
    md.push_str(&format!("| Extractions Failed | {} |\n", report.failed_count()));
    md.push_str(&format!("| Files Written | {} |\n\n", report.saved_files.len()));

    if !report.results.is_empty() {
        md.push_str(&format!(
            "Acceptance rate: {:.2}%\n\n",
            report.accepted_count() as f64 / report.results.len() as f64 * 100.0
        ));
    }

    // Discovery errors
    if !report.discovery_errors.is_empty() {
        md.push_str("## Discovery Errors\n\n");
        md.push_str("| URL | Cause |\n");
        md.push_str("|-----|-------|\n");
        for error in report.discovery_errors.iter().take(MAX_LISTED_ERRORS) {
            md.push_str(&format!(
                "| {} | {} |\n",
                cell(error.url.as_str()),
                cell(&error.cause)
            ));
        }
        if report.discovery_errors.len() > MAX_LISTED_ERRORS {
            md.push_str(&format!(
                "\n... and {} more\n",
                report.discovery_errors.len() - MAX_LISTED_ERRORS
            ));
        }
        md.push('\n');
    }

    // Per-URL outcomes
    if !report.results.is_empty() {
        md.push_str("## Extraction Results\n\n");
        md.push_str("| URL | Outcome | Characters |\n");
        md.push_str("|-----|---------|------------|\n");
        for result in &report.results {
            let outcome = match &result.outcome {
                ExtractionOutcome::Accepted => "accepted".to_string(),
                ExtractionOutcome::Rejected(reason) => format!("rejected: {}", reason),
                ExtractionOutcome::Failed(cause) => format!("failed: {}", cause),
            };
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                cell(&result.url),
                cell(&outcome),
                result.text.chars().count()
            ));
        }
        md.push('\n');
    }

    md
}

/// Keeps a value inside one table cell
fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\n', '\r'], " ")
}
