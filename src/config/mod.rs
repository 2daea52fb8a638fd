//! # Configuration
//!
//! All runtime configuration is read **once** at [`crate::Fabric::open`] and
//! baked into an immutable [`Config`] that is passed down into every
//! component. Nothing in the engine re-reads the environment after open.
//!
//! ## Environment Variables
//!
//! - `CF_EMBEDDING_CACHE=on|off`: preload the two embedding CSRs (levUp,
//!   levDown) into process memory instead of serving them from the mapped
//!   files. Costs roughly 100 MB for a 1.4M-node corpus and removes mmap
//!   page faults on traversal-heavy queries.
//! - `CF_CACHE_DIR`: overrides the per-user corpus cache directory.
//!
//! Numeric tunables live in [`constants`].

pub mod constants;

use std::path::PathBuf;
use std::time::Duration;

/// Immutable engine configuration, fixed at `Fabric::open`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Copy levUp/levDown out of the map into owned memory at open.
    pub embedding_cache: bool,
    /// Per-user corpus cache directory, if overridden.
    pub cache_dir: Option<PathBuf>,
    /// Default wall-clock budget applied to every search call that does not
    /// pass its own. `None` means unlimited.
    pub query_budget: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            embedding_cache: false,
            cache_dir: None,
            query_budget: None,
        }
    }
}

impl Config {
    /// Builds a config from the process environment.
    pub fn from_env() -> Self {
        let embedding_cache = match std::env::var("CF_EMBEDDING_CACHE") {
            Ok(v) => matches!(v.trim(), "on" | "1" | "true"),
            Err(_) => false,
        };
        let cache_dir = std::env::var_os("CF_CACHE_DIR").map(PathBuf::from);
        Config {
            embedding_cache,
            cache_dir,
            query_budget: None,
        }
    }

    pub fn with_embedding_cache(mut self, on: bool) -> Self {
        self.embedding_cache = on;
        self
    }

    pub fn with_query_budget(mut self, budget: Duration) -> Self {
        self.query_budget = Some(budget);
        self
    }
}
