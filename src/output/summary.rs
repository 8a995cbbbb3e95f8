//! Crawl summary
//!
//! A `CrawlSummary` condenses a finished job into the figures printed at
//! the end of a run and written to the markdown report.

use crate::crawler::JobReport;
use crate::state::CrawlFailure;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Summary statistics for a crawl
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    // Run metadata
    pub mode: String,
    pub seed_url: String,
    pub status: String,
    pub config_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    // Progress
    pub pages_visited: Option<u32>,
    pub items_found: Option<usize>,
    pub details_fetched: Option<usize>,
    pub records: usize,

    // Failures
    pub failures_by_kind: BTreeMap<String, usize>,
    pub failures: Vec<CrawlFailure>,
}

impl CrawlSummary {
    /// Builds a summary from a finished job
    ///
    /// # Arguments
    ///
    /// * `report` - The job outcome
    /// * `seed_url` - The URL the crawl started from
    /// * `started_at` - When the crawl started
    pub fn from_report(report: &JobReport, seed_url: &str, started_at: DateTime<Utc>) -> Self {
        let mut failures_by_kind = BTreeMap::new();
        for failure in report.failures() {
            *failures_by_kind
                .entry(failure.reason.as_str().to_string())
                .or_insert(0) += 1;
        }

        let (pages_visited, items_found, details_fetched) = match report {
            JobReport::Pagination(r) => (Some(r.pages_visited), None, None),
            JobReport::ListDetail(r) => (None, Some(r.items_found), Some(r.details_fetched)),
        };

        Self {
            mode: report.mode_name().to_string(),
            seed_url: seed_url.to_string(),
            status: report.status().to_string(),
            config_hash: None,
            started_at,
            finished_at: Utc::now(),
            pages_visited,
            items_found,
            details_fetched,
            records: report.records().len(),
            failures_by_kind,
            failures: report.failures().to_vec(),
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Wall-clock duration of the crawl in seconds
    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    pub fn total_failures(&self) -> usize {
        self.failures.len()
    }
}

/// Prints a summary to stdout in a formatted manner
///
/// # Arguments
///
/// * `summary` - The summary to display
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Overview:");
    println!("  Mode: {}", summary.mode);
    println!("  Seed: {}", summary.seed_url);
    println!("  Status: {}", summary.status);
    println!("  Duration: {:.1}s", summary.duration_seconds());
    if let Some(pages) = summary.pages_visited {
        println!("  Pages visited: {}", pages);
    }
    if let Some(items) = summary.items_found {
        println!("  Items found: {}", items);
    }
    if let Some(details) = summary.details_fetched {
        println!("  Detail pages fetched: {}", details);
    }
    println!("  Records extracted: {}", summary.records);
    println!();

    if summary.failures.is_empty() {
        println!("No failures.");
        return;
    }

    println!("Failures by Kind:");
    let mut kinds: Vec<_> = summary.failures_by_kind.iter().collect();
    kinds.sort_by(|a, b| b.1.cmp(a.1));
    for (kind, count) in kinds {
        println!("  {}: {}", kind, count);
    }
    println!();

    println!("Failed URLs:");
    for failure in &summary.failures {
        println!("  {}", failure);
    }
}
