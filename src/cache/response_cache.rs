//! Response cache implementation
//!
//! Entries expire lazily: a lookup after the TTL has elapsed returns nothing
//! and evicts the stale entry. When a capacity is set, inserting past it
//! evicts the least recently inserted entry.

use crate::crawler::FetchResult;
use crate::url::normalize_parsed;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

struct CacheEntry {
    result: FetchResult,
    inserted_at: Instant,
    ttl: Duration,
    /// Insertion sequence number, matched against `order` on eviction
    seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<Url, CacheEntry>,
    /// Insertion order; may contain superseded `(key, seq)` pairs
    order: VecDeque<(Url, u64)>,
    next_seq: u64,
}

/// Cache of fetch results keyed by normalized URL
///
/// Safe to share between concurrent fetches; all state updates are
/// serialized behind one mutex.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    capacity: Option<usize>,
}

impl ResponseCache {
    /// Creates an unbounded cache
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: None,
        }
    }

    /// Creates a cache holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: Some(capacity),
        }
    }

    /// Looks up a URL, evicting the entry if it has expired
    pub fn get(&self, url: &Url) -> Option<FetchResult> {
        let key = cache_key(url);
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = inner.entries.get(&key)?.is_expired(now);
        if expired {
            tracing::trace!("Cache entry for {} expired", key);
            inner.entries.remove(&key);
            return None;
        }

        inner.entries.get(&key).map(|entry| entry.result.clone())
    }

    /// Stores a result, replacing any existing entry for the same URL
    pub fn put(&self, url: &Url, result: FetchResult, ttl: Duration) {
        if self.capacity == Some(0) {
            return;
        }

        let key = cache_key(url);
        let mut inner = self.lock();

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.push_back((key.clone(), seq));
        inner.entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
                ttl,
                seq,
            },
        );

        if let Some(capacity) = self.capacity {
            while inner.entries.len() > capacity {
                let Some((oldest, oldest_seq)) = inner.order.pop_front() else {
                    break;
                };
                let current = inner.entries.get(&oldest).map(|entry| entry.seq);
                if current == Some(oldest_seq) {
                    tracing::trace!("Evicting {} from cache (capacity {})", oldest, capacity);
                    inner.entries.remove(&oldest);
                }
            }
        }

        compact_order(&mut inner);
    }

    /// Removes the entry for a URL, returning whether one was present
    pub fn remove(&self, url: &Url) -> bool {
        let key = cache_key(url);
        self.lock().entries.remove(&key).is_some()
    }

    /// Removes every entry
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Number of stored entries, including expired ones not yet looked up
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_key(url: &Url) -> Url {
    normalize_parsed(url.clone()).unwrap_or_else(|_| url.clone())
}

/// Drops superseded order entries once they dominate the queue
fn compact_order(inner: &mut CacheInner) {
    if inner.order.len() <= inner.entries.len() * 2 + 16 {
        return;
    }
    let CacheInner { entries, order, .. } = inner;
    order.retain(|(key, seq)| entries.get(key).map(|entry| entry.seq) == Some(*seq));
}
