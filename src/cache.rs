//! TTL cache for search results.
//!
//! Repeated queries are common when an agent iterates on a question, and
//! backend runs are the expensive part of every search. The cache keys on
//! the full query fingerprint (terms, scope, caps) so two requests that
//! could produce different output never share an entry. Eviction is
//! oldest-first once the capacity is reached; entries also lapse after the
//! TTL regardless of capacity.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::backend::SearchResult;
use crate::query::SearchQuery;

const FINGERPRINT_LEN: usize = 16;

struct CacheEntry {
    result: SearchResult,
    created_at: Instant,
    hits: u64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_size: usize,
    pub total_hits: u64,
}

/// Bounded TTL cache, shared across all searches.
pub struct SearchCache {
    max_size: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SearchCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            max_size,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached result for this exact query, if still fresh.
    pub fn get(&self, query: &SearchQuery) -> Option<SearchResult> {
        let key = fingerprint(query);
        let mut entries = self.lock();
        match entries.get_mut(&key) {
            Some(entry) if entry.created_at.elapsed() <= self.ttl => {
                entry.hits += 1;
                debug!(key = %key, hits = entry.hits, "search cache hit");
                Some(entry.result.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Stores a result, evicting the oldest entry when full. A zero
    /// capacity disables caching entirely.
    pub fn store(&self, query: &SearchQuery, result: &SearchResult) {
        if self.max_size == 0 {
            return;
        }
        let key = fingerprint(query);
        let mut entries = self.lock();
        if !entries.contains_key(&key) && entries.len() >= self.max_size {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                result: result.clone(),
                created_at: Instant::now(),
                hits: 0,
            },
        );
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            entries: entries.len(),
            max_size: self.max_size,
            total_hits: entries.values().map(|entry| entry.hits).sum(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Stable short key over everything that affects a search outcome.
fn fingerprint(query: &SearchQuery) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.terms().as_bytes());
    hasher.update(b":");
    hasher.update(query.scope.label().as_bytes());
    hasher.update(format!(":context_lines={}", query.context_lines).as_bytes());
    hasher.update(format!(":max_results={}", query.max_results).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}
