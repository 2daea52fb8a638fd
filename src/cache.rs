//! # Result Cache
//!
//! A keyed cache `(corpus, template) -> materialized result handle` for
//! server surfaces that page through results across calls. Entries carry a
//! TTL; eviction removes expired entries first, then the least recently
//! used. The cache is purely opportunistic - a miss re-executes the query,
//! and correctness never depends on a hit.
//!
//! Cursors are `(handle id, offset)`: `page` returns a slice, whether more
//! results remain, and the total, so a server can hand out stable
//! continuation tokens without holding the result set itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::constants::{
    RESULT_CACHE_MAX_ENTRIES, RESULT_CACHE_MAX_TUPLES, RESULT_CACHE_TTL_SECS,
};
use crate::Node;

/// One cached search: the canonical tuple list plus bookkeeping.
#[derive(Debug)]
pub struct CachedResult {
    pub handle_id: u64,
    pub corpus: String,
    pub template: String,
    pub tuples: Vec<Vec<Node>>,
    pub created_at: Instant,
    pub expires_at: Instant,
    last_accessed: Mutex<Instant>,
}

impl CachedResult {
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }

    fn touch(&self) {
        *self.last_accessed.lock() = Instant::now();
    }
}

/// A page of cached results.
#[derive(Debug, Clone)]
pub struct ResultPage {
    pub tuples: Vec<Vec<Node>>,
    pub has_more: bool,
    pub total: usize,
    pub expires_at: Instant,
}

pub struct ResultCache {
    ttl: Duration,
    max_entries: usize,
    max_tuples: usize,
    next_id: AtomicU64,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    by_key: HashMap<(String, String), Arc<CachedResult>>,
    by_id: HashMap<u64, Arc<CachedResult>>,
}

impl Default for ResultCache {
    fn default() -> Self {
        ResultCache::new(
            Duration::from_secs(RESULT_CACHE_TTL_SECS),
            RESULT_CACHE_MAX_ENTRIES,
            RESULT_CACHE_MAX_TUPLES,
        )
    }
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize, max_tuples: usize) -> Self {
        ResultCache {
            ttl,
            max_entries,
            max_tuples,
            next_id: AtomicU64::new(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Returns the cached result for `(corpus, template)` or executes the
    /// search and caches it. The produce function runs outside any lock on
    /// a miss.
    pub fn get_or_execute(
        &self,
        corpus: &str,
        template: &str,
        produce: impl FnOnce() -> Result<Vec<Vec<Node>>>,
    ) -> Result<Arc<CachedResult>> {
        let key = (corpus.to_string(), template.trim().to_string());
        {
            let inner = self.inner.lock();
            if let Some(entry) = inner.by_key.get(&key) {
                if !entry.is_expired() {
                    debug!(corpus, "result cache hit");
                    entry.touch();
                    return Ok(entry.clone());
                }
            }
        }

        debug!(corpus, "result cache miss");
        let mut tuples = produce()?;
        if tuples.len() > self.max_tuples {
            debug!(
                total = tuples.len(),
                kept = self.max_tuples,
                "truncating cached result set"
            );
            tuples.truncate(self.max_tuples);
        }

        let now = Instant::now();
        let entry = Arc::new(CachedResult {
            handle_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            corpus: key.0.clone(),
            template: key.1.clone(),
            tuples,
            created_at: now,
            expires_at: now + self.ttl,
            last_accessed: Mutex::new(now),
        });

        let mut inner = self.inner.lock();
        evict(&mut inner, self.max_entries);
        // A racing writer may have filled the slot meanwhile; last write
        // wins, both entries hold the same tuples.
        if let Some(old) = inner.by_key.insert(key, entry.clone()) {
            inner.by_id.remove(&old.handle_id);
        }
        inner.by_id.insert(entry.handle_id, entry.clone());
        Ok(entry)
    }

    /// Looks up a live handle by id.
    pub fn by_handle(&self, handle_id: u64) -> Option<Arc<CachedResult>> {
        let inner = self.inner.lock();
        let entry = inner.by_id.get(&handle_id)?;
        if entry.is_expired() {
            return None;
        }
        entry.touch();
        Some(entry.clone())
    }

    /// One page of a cached result; `None` when the cursor has expired.
    pub fn page(&self, handle_id: u64, offset: usize, limit: usize) -> Option<ResultPage> {
        let entry = self.by_handle(handle_id)?;
        let total = entry.tuples.len();
        let end = (offset + limit).min(total);
        let tuples = entry
            .tuples
            .get(offset..end)
            .map(|s| s.to_vec())
            .unwrap_or_default();
        Some(ResultPage {
            tuples,
            has_more: end < total,
            total,
            expires_at: entry.expires_at,
        })
    }

    /// Drops expired entries; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<(String, String)> = inner
            .by_key
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            if let Some(entry) = inner.by_key.remove(key) {
                inner.by_id.remove(&entry.handle_id);
            }
        }
        expired.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_key.clear();
        inner.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// TTL cleanup first, then LRU down to capacity.
fn evict(inner: &mut Inner, max_entries: usize) {
    let expired: Vec<(String, String)> = inner
        .by_key
        .iter()
        .filter(|(_, e)| e.is_expired())
        .map(|(k, _)| k.clone())
        .collect();
    for key in expired {
        if let Some(entry) = inner.by_key.remove(&key) {
            inner.by_id.remove(&entry.handle_id);
        }
    }

    while inner.by_key.len() >= max_entries {
        let lru = inner
            .by_key
            .iter()
            .min_by_key(|(_, e)| *e.last_accessed.lock())
            .map(|(k, _)| k.clone());
        let Some(key) = lru else { break };
        if let Some(entry) = inner.by_key.remove(&key) {
            inner.by_id.remove(&entry.handle_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuples(n: usize) -> Vec<Vec<Node>> {
        (0..n as Node).map(|i| vec![i + 1]).collect()
    }

    #[test]
    fn hit_skips_re_execution() {
        let cache = ResultCache::default();
        let first = cache
            .get_or_execute("bhsa", "word", || Ok(tuples(3)))
            .unwrap();
        let second = cache
            .get_or_execute("bhsa", "word", || panic!("must not re-execute"))
            .unwrap();
        assert_eq!(first.handle_id, second.handle_id);
    }

    #[test]
    fn whitespace_insensitive_template_key() {
        let cache = ResultCache::default();
        let a = cache
            .get_or_execute("bhsa", "word\n", || Ok(tuples(1)))
            .unwrap();
        let b = cache
            .get_or_execute("bhsa", "word", || panic!("must not re-execute"))
            .unwrap();
        assert_eq!(a.handle_id, b.handle_id);
    }

    #[test]
    fn pagination_preserves_order_and_reports_more() {
        let cache = ResultCache::default();
        let entry = cache
            .get_or_execute("bhsa", "word", || Ok(tuples(5)))
            .unwrap();

        let page = cache.page(entry.handle_id, 0, 3).unwrap();
        assert_eq!(page.tuples, tuples(3));
        assert!(page.has_more);
        assert_eq!(page.total, 5);

        let rest = cache.page(entry.handle_id, 3, 10).unwrap();
        assert_eq!(rest.tuples, vec![vec![4], vec![5]]);
        assert!(!rest.has_more);
    }

    #[test]
    fn expired_entries_re_execute() {
        let cache = ResultCache::new(Duration::from_secs(0), 10, 100);
        cache
            .get_or_execute("bhsa", "word", || Ok(tuples(1)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let mut ran = false;
        cache
            .get_or_execute("bhsa", "word", || {
                ran = true;
                Ok(tuples(1))
            })
            .unwrap();
        assert!(ran);
    }

    #[test]
    fn lru_eviction_respects_capacity() {
        let cache = ResultCache::new(Duration::from_secs(60), 2, 100);
        cache.get_or_execute("c", "a", || Ok(tuples(1))).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        cache.get_or_execute("c", "b", || Ok(tuples(1))).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        cache.get_or_execute("c", "d", || Ok(tuples(1))).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn truncation_caps_cached_tuples() {
        let cache = ResultCache::new(Duration::from_secs(60), 10, 3);
        let entry = cache
            .get_or_execute("c", "many", || Ok(tuples(10)))
            .unwrap();
        assert_eq!(entry.tuples.len(), 3);
    }
}
