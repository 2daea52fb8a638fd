//! # Interned String Pools
//!
//! String-valued features never store strings per node. At compile time the
//! distinct values are sorted, deduplicated and written to a JSON pool; the
//! per-node array stores `u32` indices into that pool, with `u32::MAX` as
//! the absence sentinel. Filters resolve their comparand to a pool index
//! once (binary search over the sorted values) and then compare integers,
//! which is what makes the bulk predicates a single linear integer sweep.
//!
//! The pool also carries per-value occurrence counts, computed exactly at
//! compile time. The search planner reads them as its value histogram.

use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::error::FabricError;

/// Sentinel index meaning "absent" in string feature index arrays.
pub const MISSING_STR_INDEX: u32 = u32::MAX;

#[derive(Debug, Serialize, Deserialize)]
struct PoolData {
    values: Vec<String>,
    counts: Vec<u64>,
}

/// A sorted, deduplicated string table with exact occurrence counts.
#[derive(Debug)]
pub struct StringPool {
    values: Vec<String>,
    counts: Vec<u64>,
}

impl StringPool {
    /// Builds a pool from `(value, count)` pairs. Values are sorted; the
    /// resulting indices are what the compiler writes into index arrays.
    pub fn from_counts(mut pairs: Vec<(String, u64)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs.dedup_by(|a, b| {
            if a.0 == b.0 {
                b.1 += a.1;
                true
            } else {
                false
            }
        });
        let (values, counts) = pairs.into_iter().unzip();
        StringPool { values, counts }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| FabricError::io(path, e))
            .wrap_err_with(|| format!("failed to read string pool '{}'", path.display()))?;
        let data: PoolData = serde_json::from_slice(&bytes)
            .map_err(|e| FabricError::corrupt(format!("'{}': invalid pool json: {e}", path.display())))?;
        ensure!(
            data.values.len() == data.counts.len(),
            FabricError::corrupt(format!(
                "'{}': {} values but {} counts",
                path.display(),
                data.values.len(),
                data.counts.len()
            ))
        );
        ensure!(
            data.values.windows(2).all(|w| w[0] < w[1]),
            FabricError::corrupt(format!(
                "'{}': pool values not sorted and unique",
                path.display()
            ))
        );
        Ok(StringPool {
            values: data.values,
            counts: data.counts,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = PoolData {
            values: self.values.clone(),
            counts: self.counts.clone(),
        };
        let json = serde_json::to_vec(&data).wrap_err("failed to serialize string pool")?;
        std::fs::write(path, json)
            .map_err(|e| FabricError::io(path, e))
            .wrap_err_with(|| format!("failed to write string pool '{}'", path.display()))?;
        Ok(())
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, index: u32) -> Option<&str> {
        self.values.get(index as usize).map(String::as_str)
    }

    /// Reverse lookup: value -> pool index. An unknown value returns `None`,
    /// which filters translate to "never matches" (not an error).
    #[inline]
    pub fn lookup(&self, value: &str) -> Option<u32> {
        self.values
            .binary_search_by(|v| v.as_str().cmp(value))
            .ok()
            .map(|i| i as u32)
    }

    /// Exact occurrence count of a value across the corpus.
    pub fn count(&self, value: &str) -> u64 {
        self.lookup(value)
            .map(|i| self.counts[i as usize])
            .unwrap_or(0)
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Total occurrences across all values.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}
