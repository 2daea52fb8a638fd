//! # Configuration Constants
//!
//! Centralized tunables. Constants that depend on each other are co-located
//! and their relationships documented, so a change to one is checked against
//! its dependents.
//!
//! ```text
//! CANCEL_BATCH (1024 candidates)
//!       │
//!       └─> The executor checks the cancel flag and the time budget once
//!           per batch. Lowering it tightens cancellation latency at the
//!           cost of more clock reads in the join loop.
//!
//! RESULT_CACHE_TTL (300 s)
//!       │
//!       └─> RESULT_CACHE_MAX_ENTRIES (100) - eviction runs TTL cleanup
//!           first, then LRU down to this bound.
//!
//! RESULT_CACHE_MAX_TUPLES (10_000)
//!           Per-entry cap on materialized tuples; larger result sets are
//!           truncated in the cache (the search itself is not truncated).
//! ```

/// Candidate batch size between cancel-flag / budget checks in the executor.
pub const CANCEL_BATCH: usize = 1024;

/// Result-cache entry time-to-live, in seconds.
pub const RESULT_CACHE_TTL_SECS: u64 = 300;

/// Maximum number of cached searches.
pub const RESULT_CACHE_MAX_ENTRIES: usize = 100;

/// Maximum tuples materialized per cache entry.
pub const RESULT_CACHE_MAX_TUPLES: usize = 10_000;

/// Hard ceiling on results fetched when the caller gives no limit, as a
/// multiple of the corpus node count.
pub const SEARCH_FAIL_FACTOR: u64 = 4;

/// Selectivity assumed for regex predicates, which have no histogram.
pub const REGEX_SELECTIVITY: f64 = 0.5;

/// Discount applied to an atom's cardinality estimate when a bound
/// neighbor relation can prune it (embedding, adjacency, boundary
/// equality). Chosen conservatively; only the ordering matters.
pub const BOUND_NEIGHBOR_DISCOUNT: f64 = 0.1;

const _: () = assert!(RESULT_CACHE_MAX_ENTRIES > 0);
const _: () = assert!(CANCEL_BATCH >= 1);
