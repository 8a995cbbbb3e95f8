//! Markdown summary generation
//!
//! This module generates a human-readable markdown report of a crawl,
//! including progress figures and every failed URL.

use crate::output::summary::CrawlSummary;
use crate::output::traits::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Failed URLs listed in full before the table is truncated
const MAX_LISTED_FAILURES: usize = 100;

/// Writes a markdown summary to a file
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Harvest-Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Mode**: {}\n", summary.mode));
    md.push_str(&format!("- **Seed URL**: {}\n", summary.seed_url));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        summary.duration_seconds()
    ));
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    if let Some(hash) = &summary.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    // Progress
    md.push_str("## Results\n\n");
    md.push_str("| Measure | Count |\n");
    md.push_str("|---------|-------|\n");
    if let Some(pages) = summary.pages_visited {
        md.push_str(&format!("| Pages Visited | {} |\n", pages));
    }
    if let Some(items) = summary.items_found {
        md.push_str(&format!("| Items Found | {} |\n", items));
    }
    if let Some(details) = summary.details_fetched {
        md.push_str(&format!("| Detail Pages Fetched | {} |\n", details));
    }
    md.push_str(&format!("| Records | {} |\n", summary.records));
    md.push_str(&format!("| Failures | {} |\n\n", summary.total_failures()));

    if summary.failures.is_empty() {
        return md;
    }

    // Failure breakdown
    md.push_str("## Failure Summary\n\n");
    md.push_str("| Kind | Count |\n");
    md.push_str("|------|-------|\n");
    for (kind, count) in &summary.failures_by_kind {
        md.push_str(&format!("| {} | {} |\n", kind, count));
    }
    md.push('\n');

    md.push_str("## Failed URLs\n\n");
    md.push_str("| URL | Kind | Message |\n");
    md.push_str("|-----|------|---------|\n");
    for failure in summary.failures.iter().take(MAX_LISTED_FAILURES) {
        md.push_str(&format!(
            "| {} | {} | {} |\n",
            failure.url,
            failure.reason.as_str(),
            failure.reason.to_string().replace('|', "\\|")
        ));
    }
    if summary.failures.len() > MAX_LISTED_FAILURES {
        md.push_str(&format!(
            "\n... and {} more\n",
            summary.failures.len() - MAX_LISTED_FAILURES
        ));
    }
    md.push('\n');

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CrawlFailure, FailureReason};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use url::Url;

    fn create_test_summary() -> CrawlSummary {
        CrawlSummary {
            mode: "pagination".to_string(),
            seed_url: "https://quotes.example.com/page/1/".to_string(),
            status: "completed".to_string(),
            config_hash: Some("abc123".to_string()),
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            finished_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 30).unwrap(),
            pages_visited: Some(10),
            items_found: None,
            details_fetched: None,
            records: 100,
            failures_by_kind: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_format_markdown_summary() {
        let markdown = format_markdown_summary(&create_test_summary());

        assert!(markdown.contains("# Harvest-Crawl Summary"));
        assert!(markdown.contains("- **Mode**: pagination"));
        assert!(markdown.contains("- **Duration**: 90.0 seconds"));
        assert!(markdown.contains("- **Config Hash**: abc123"));
        assert!(markdown.contains("| Pages Visited | 10 |"));
        assert!(markdown.contains("| Records | 100 |"));
        assert!(!markdown.contains("Items Found"));
        assert!(!markdown.contains("Failed URLs"));
    }

    #[test]
    fn test_markdown_lists_failures() {
        let mut summary = create_test_summary();
        summary.failures = vec![CrawlFailure::new(
            Url::parse("https://quotes.example.com/page/4/").unwrap(),
            FailureReason::OutsideBoundary,
        )];
        summary
            .failures_by_kind
            .insert("outside_boundary".to_string(), 1);

        let markdown = format_markdown_summary(&summary);

        assert!(markdown.contains("## Failure Summary"));
        assert!(markdown.contains("| outside_boundary | 1 |"));
        assert!(markdown.contains("| https://quotes.example.com/page/4/ | outside_boundary |"));
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.md");

        generate_markdown_summary(&create_test_summary(), &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Harvest-Crawl Summary"));
    }
}
