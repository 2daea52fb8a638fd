//! # Node Features
//!
//! A node feature is a dense array indexed by `node - 1`: `i32` cells with
//! `i32::MIN` as the absence sentinel for integer features, `u32` pool
//! indices with `u32::MAX` for string features. The two backends sit behind
//! one tagged handle so callers never dispatch on the value type themselves.
//!
//! ## Bulk Filtering
//!
//! The `filter_*` family is the workhorse of the search engine. Each filter
//! resolves its comparand once - for string features that means one binary
//! search of the pool, after which *all* comparisons are integer compares
//! against the contiguous index array. An unknown string value resolves to
//! "never matches", not an error. Out-of-bounds input nodes are silently
//! dropped; scalar `value()` reads them as absent.

use std::sync::Arc;

use hashbrown::HashMap;

use super::FeatureValue;
use crate::storage::{
    I32Array, Store, StringPool, U32Array, ValueType, MISSING_INT, MISSING_STR_INDEX,
};
use crate::Node;

#[derive(Debug)]
pub struct IntBacked {
    values: I32Array,
}

#[derive(Debug)]
pub struct StrBacked {
    indices: U32Array,
    pool: Arc<StringPool>,
}

/// A materialized node feature handle.
#[derive(Debug)]
pub struct NodeFeature {
    name: String,
    store: Arc<Store>,
    backend: Backend,
}

#[derive(Debug)]
enum Backend {
    Int(IntBacked),
    Str(StrBacked),
}

impl NodeFeature {
    pub fn new_int(name: String, store: Arc<Store>, values: I32Array) -> Self {
        NodeFeature {
            name,
            store,
            backend: Backend::Int(IntBacked { values }),
        }
    }

    pub fn new_str(
        name: String,
        store: Arc<Store>,
        indices: U32Array,
        pool: Arc<StringPool>,
    ) -> Self {
        NodeFeature {
            name,
            store,
            backend: Backend::Str(StrBacked { indices, pool }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        match &self.backend {
            Backend::Int(_) => ValueType::Int,
            Backend::Str(_) => ValueType::Str,
        }
    }

    /// The string pool behind a string feature.
    pub fn pool(&self) -> Option<&Arc<StringPool>> {
        match &self.backend {
            Backend::Str(s) => Some(&s.pool),
            Backend::Int(_) => None,
        }
    }

    /// Scalar lookup. Absent for sentinel cells and out-of-bounds nodes.
    pub fn value(&self, n: Node) -> Option<FeatureValue> {
        if n < 1 {
            return None;
        }
        let i = (n - 1) as usize;
        match &self.backend {
            Backend::Int(b) => match b.values.get(i) {
                Some(v) if v != MISSING_INT => Some(FeatureValue::Int(v)),
                _ => None,
            },
            Backend::Str(b) => match b.indices.get(i) {
                Some(idx) if idx != MISSING_STR_INDEX => {
                    b.pool.get(idx).map(|s| FeatureValue::Str(s.to_string()))
                }
                _ => None,
            },
        }
    }

    /// Borrowed string lookup, avoiding the allocation of [`Self::value`].
    pub fn str_value(&self, n: Node) -> Option<&str> {
        if n < 1 {
            return None;
        }
        match &self.backend {
            Backend::Str(b) => match b.indices.get((n - 1) as usize) {
                Some(idx) if idx != MISSING_STR_INDEX => b.pool.get(idx),
                _ => None,
            },
            Backend::Int(_) => None,
        }
    }

    pub fn int_value(&self, n: Node) -> Option<i32> {
        if n < 1 {
            return None;
        }
        match &self.backend {
            Backend::Int(b) => match b.values.get((n - 1) as usize) {
                Some(v) if v != MISSING_INT => Some(v),
                _ => None,
            },
            Backend::Str(_) => None,
        }
    }

    /// Resolves a value to the integer comparand used by the filters.
    /// `None` means the value can never match (unknown pool string, or a
    /// type mismatch against this backend).
    fn comparand(&self, value: &FeatureValue) -> Option<u32> {
        match (&self.backend, value) {
            (Backend::Int(_), FeatureValue::Int(v)) if *v != MISSING_INT => Some(*v as u32),
            (Backend::Str(b), FeatureValue::Str(v)) => b.pool.lookup(v),
            _ => None,
        }
    }

    /// Raw cell word at `node - 1`, uniform across backends. `None` only
    /// for out-of-bounds.
    #[inline]
    fn cell(&self, n: Node) -> Option<(u32, bool)> {
        if n < 1 {
            return None;
        }
        let i = (n - 1) as usize;
        match &self.backend {
            Backend::Int(b) => b
                .values
                .get(i)
                .map(|v| (v as u32, v != MISSING_INT)),
            Backend::Str(b) => b
                .indices
                .get(i)
                .map(|idx| (idx, idx != MISSING_STR_INDEX)),
        }
    }

    /// Subset of `nodes` whose value equals `value`.
    pub fn filter_eq(&self, nodes: &[Node], value: &FeatureValue) -> Vec<Node> {
        let Some(cmp) = self.comparand(value) else {
            return Vec::new();
        };
        nodes
            .iter()
            .copied()
            .filter(|&n| matches!(self.cell(n), Some((w, true)) if w == cmp))
            .collect()
    }

    /// Subset of `nodes` whose value is any of `values`.
    pub fn filter_in(&self, nodes: &[Node], values: &[FeatureValue]) -> Vec<Node> {
        let mut cmps: Vec<u32> = values.iter().filter_map(|v| self.comparand(v)).collect();
        if cmps.is_empty() {
            return Vec::new();
        }
        cmps.sort_unstable();
        cmps.dedup();
        nodes
            .iter()
            .copied()
            .filter(|&n| {
                matches!(self.cell(n), Some((w, true)) if cmps.binary_search(&w).is_ok())
            })
            .collect()
    }

    /// Subset of `nodes` carrying a value different from `value`. Absent
    /// cells do not match: "different value" presumes a value.
    pub fn filter_ne(&self, nodes: &[Node], value: &FeatureValue) -> Vec<Node> {
        let cmp = self.comparand(value);
        nodes
            .iter()
            .copied()
            .filter(|&n| match self.cell(n) {
                Some((w, true)) => cmp != Some(w),
                _ => false,
            })
            .collect()
    }

    /// Subset of `nodes` carrying any value.
    pub fn filter_present(&self, nodes: &[Node]) -> Vec<Node> {
        nodes
            .iter()
            .copied()
            .filter(|&n| matches!(self.cell(n), Some((_, true))))
            .collect()
    }

    /// Subset of `nodes` carrying no value. Out-of-bounds inputs are
    /// dropped, not reported absent: they are not nodes of this corpus.
    pub fn filter_absent(&self, nodes: &[Node]) -> Vec<Node> {
        nodes
            .iter()
            .copied()
            .filter(|&n| matches!(self.cell(n), Some((_, false))))
            .collect()
    }

    /// All nodes carrying `value`, in canonical order.
    pub fn nodes_with_value(&self, value: &FeatureValue) -> Vec<Node> {
        let Some(cmp) = self.comparand(value) else {
            return Vec::new();
        };
        let mut nodes: Vec<Node> = match &self.backend {
            Backend::Int(b) => b
                .values
                .slice()
                .iter()
                .enumerate()
                .filter(|(_, v)| v.get() as u32 == cmp && v.get() != MISSING_INT)
                .map(|(i, _)| i as Node + 1)
                .collect(),
            Backend::Str(b) => b
                .indices
                .slice()
                .iter()
                .enumerate()
                .filter(|(_, idx)| idx.get() == cmp)
                .map(|(i, _)| i as Node + 1)
                .collect(),
        };
        nodes.sort_by_key(|&n| self.store.rank_of(n).unwrap_or(u32::MAX));
        nodes
    }

    /// Value histogram, highest counts first, value-ascending on ties.
    /// Counts are exact; for string features they come straight from the
    /// compile-time pool.
    pub fn freq_list(&self) -> Vec<(FeatureValue, u64)> {
        let mut pairs: Vec<(FeatureValue, u64)> = match &self.backend {
            Backend::Str(b) => b
                .pool
                .values()
                .iter()
                .zip(b.pool.counts())
                .map(|(v, c)| (FeatureValue::Str(v.clone()), *c))
                .collect(),
            Backend::Int(b) => {
                let mut counts: HashMap<i32, u64> = HashMap::new();
                for v in b.values.slice() {
                    let v = v.get();
                    if v != MISSING_INT {
                        *counts.entry(v).or_insert(0) += 1;
                    }
                }
                counts
                    .into_iter()
                    .map(|(v, c)| (FeatureValue::Int(v), c))
                    .collect()
            }
        };
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        pairs
    }

    /// Exact occurrence count of one value, from the compile-time
    /// histogram where available.
    pub fn value_count(&self, value: &FeatureValue) -> u64 {
        match (&self.backend, value) {
            (Backend::Str(b), FeatureValue::Str(v)) => b.pool.count(v),
            (Backend::Int(b), FeatureValue::Int(v)) => {
                if *v == MISSING_INT {
                    return 0;
                }
                b.values.slice().iter().filter(|c| c.get() == *v).count() as u64
            }
            _ => 0,
        }
    }
}
