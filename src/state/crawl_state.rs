//! Per-crawl bookkeeping
//!
//! A `CrawlState` is owned by exactly one crawl invocation. It tracks the
//! visited set, the frontier of pages still to fetch, the accumulated records
//! and failures, and (for list-detail crawls) one result slot per detail link
//! so that concurrent completions can be reassembled in list order.

use super::outcome::{CrawlFailure, FailureReason};
use crate::extract::Record;
use crate::url::normalize_parsed;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// Result of one detail fetch: the records extracted from it, or the failure
pub type DetailOutcome = Result<Vec<Record>, CrawlFailure>;

/// A detail link waiting for its result
#[derive(Debug)]
struct DetailSlot {
    url: Url,
    outcome: Option<DetailOutcome>,
}

/// Mutable state of a single crawl
#[derive(Debug, Default)]
pub struct CrawlState {
    /// Normalized forms of every URL scheduled or fetched
    visited: HashSet<Url>,

    /// Pages waiting to be fetched, in discovery order
    frontier: VecDeque<Url>,

    /// Pages fetched successfully, in fetch order
    pages: Vec<Url>,

    records: Vec<Record>,
    failures: Vec<CrawlFailure>,
    slots: Vec<DetailSlot>,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a URL as visited
    ///
    /// # Returns
    ///
    /// `true` if the URL had not been seen before
    pub fn mark_visited(&mut self, url: &Url) -> bool {
        self.visited.insert(visit_key(url))
    }

    /// Returns true if the URL (after normalization) was already seen
    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(&visit_key(url))
    }

    /// Marks a URL as visited and appends it to the frontier
    ///
    /// # Returns
    ///
    /// `false` without enqueueing when the URL was already seen
    pub fn enqueue(&mut self, url: Url) -> bool {
        if !self.mark_visited(&url) {
            return false;
        }
        self.frontier.push_back(url);
        true
    }

    /// Pops the next page to fetch
    pub fn next_url(&mut self) -> Option<Url> {
        self.frontier.pop_front()
    }

    /// Records a successfully fetched page and its records
    pub fn record_page(&mut self, url: Url, records: impl IntoIterator<Item = Record>) {
        self.pages.push(url);
        self.records.extend(records);
    }

    pub fn record_failure(&mut self, failure: CrawlFailure) {
        tracing::debug!("Recording failure: {}", failure);
        self.failures.push(failure);
    }

    /// Number of pages fetched successfully so far
    pub fn pages_visited(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn pages(&self) -> &[Url] {
        &self.pages
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn failures(&self) -> &[CrawlFailure] {
        &self.failures
    }

    /// Reserves a result slot for a detail link, returning its index
    pub fn open_slot(&mut self, url: Url) -> usize {
        self.slots.push(DetailSlot { url, outcome: None });
        self.slots.len() - 1
    }

    /// Reserves a slot that is already resolved
    pub fn push_resolved_slot(&mut self, url: Url, outcome: DetailOutcome) -> usize {
        self.slots.push(DetailSlot {
            url,
            outcome: Some(outcome),
        });
        self.slots.len() - 1
    }

    /// Stores the outcome of a detail fetch
    ///
    /// Out-of-range indices are ignored; a slot is written at most once.
    pub fn fill_slot(&mut self, index: usize, outcome: DetailOutcome) {
        match self.slots.get_mut(index) {
            Some(slot) if slot.outcome.is_none() => slot.outcome = Some(outcome),
            Some(slot) => tracing::warn!("Detail slot for {} already filled", slot.url),
            None => tracing::warn!("Ignoring result for unknown detail slot {}", index),
        }
    }

    /// Number of slots that have an outcome
    pub fn filled_slots(&self) -> usize {
        self.slots.iter().filter(|slot| slot.outcome.is_some()).count()
    }

    /// Number of slots, filled or not
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots still waiting for an outcome
    pub fn unfilled_slots(&self) -> usize {
        self.slot_count() - self.filled_slots()
    }

    /// Number of slots holding records
    pub fn succeeded_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.outcome, Some(Ok(_))))
            .count()
    }

    /// Moves slot outcomes into the record and failure lists in slot order
    ///
    /// Slots without an outcome are dropped when `cancelled` is set; otherwise
    /// they are reported as interrupted.
    pub fn drain_slots(&mut self, cancelled: bool) {
        for slot in std::mem::take(&mut self.slots) {
            match slot.outcome {
                Some(Ok(records)) => self.records.extend(records),
                Some(Err(failure)) => self.failures.push(failure),
                None if cancelled => {
                    tracing::debug!("Detail {} not fetched before cancellation", slot.url);
                }
                None => self
                    .failures
                    .push(CrawlFailure::new(slot.url, FailureReason::Interrupted)),
            }
        }
    }

    /// Consumes the state, returning pages, records and failures
    pub fn into_parts(self) -> (Vec<Url>, Vec<Record>, Vec<CrawlFailure>) {
        (self.pages, self.records, self.failures)
    }
}

fn visit_key(url: &Url) -> Url {
    normalize_parsed(url.clone()).unwrap_or_else(|_| url.clone())
}
