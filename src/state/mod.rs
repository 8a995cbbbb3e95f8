//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: visited set, frontier, records and detail result slots of one crawl
//! - `CrawlStatus`: how a crawl ended
//! - `CrawlFailure`: a URL that produced no records, with the reason

mod crawl_state;
mod outcome;

// Re-export main types
pub use crawl_state::{CrawlState, DetailOutcome};
pub use outcome::{CrawlFailure, CrawlStatus, FailureReason};
