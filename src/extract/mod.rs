//! Extraction module: schemas, documents and records
//!
//! The crawl engine hands every fetched [`Document`] to [`extract`] together
//! with the caller's [`FieldSchema`]. Selector matching is delegated to the
//! `scraper` crate; this module never manipulates markup directly.

mod document;
mod extractor;
mod record;
mod schema;

pub use document::Document;
pub use extractor::{
    extract, extract_images, extract_metadata, extract_structured_data, extract_table, item_links,
    select_first_link, select_links,
};
pub use record::{FieldValue, Record};
pub use schema::{CompiledSelector, Field, FieldSchema, FieldSource, MatchMode};
