//! Response caching
//!
//! This module provides an in-memory cache of fetch results keyed by
//! normalized URL, with per-entry expiry and an optional capacity bound.

mod response_cache;

pub use response_cache::ResponseCache;
