//! Configuration module for Harvest-Crawl
//!
//! This module handles loading, parsing, and validating TOML job files.
//! A job file describes one crawl: how to fetch, what to crawl, what to
//! extract and where to write the records.
//!
//! # Example
//!
//! ```no_run
//! use harvest_crawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("job.toml")).unwrap();
//! println!("Crawl starts at {}", config.crawl.seed_url());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BoundaryMode, Config, CrawlConfig, CrawlJob, EngineConfig, FetchConfig, FieldConfig,
    OutputConfig, SchemaConfig, SourceKind,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
