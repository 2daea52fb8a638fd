//! # Edge Features
//!
//! An edge feature is a CSR from source nodes to target nodes, optionally
//! with a parallel value section. Only the forward direction exists on
//! disk; the inverse CSR is materialized in memory on first `edges_to`
//! call and published once, after which both directions are lock-free.
//!
//! Edges referencing nodes outside the corpus are skipped silently during
//! traversal (subset corpora), and querying an out-of-bounds node returns
//! the empty answer rather than an error.

use std::sync::Arc;
use std::sync::OnceLock;

use eyre::Result;

use super::FeatureValue;
use crate::storage::{Csr, Store, StringPool, ValuesRow, MISSING_STR_INDEX, NONE_INT_VALUE};
use crate::Node;

/// A materialized edge feature handle.
#[derive(Debug)]
pub struct EdgeFeature {
    name: String,
    store: Arc<Store>,
    csr: Csr,
    pool: Option<Arc<StringPool>>,
    has_values: bool,
    inverse: OnceLock<Csr>,
}

impl EdgeFeature {
    pub fn new(
        name: String,
        store: Arc<Store>,
        csr: Csr,
        pool: Option<Arc<StringPool>>,
        has_values: bool,
    ) -> Self {
        EdgeFeature {
            name,
            store,
            csr,
            pool,
            has_values,
            inverse: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_values(&self) -> bool {
        self.has_values
    }

    fn decode(&self, word: u32) -> Option<FeatureValue> {
        if !self.has_values {
            return None;
        }
        match &self.pool {
            Some(pool) => {
                if word == MISSING_STR_INDEX {
                    None
                } else {
                    pool.get(word).map(|s| FeatureValue::Str(s.to_string()))
                }
            }
            None => {
                let v = word as i32;
                if v == NONE_INT_VALUE {
                    None
                } else {
                    Some(FeatureValue::Int(v))
                }
            }
        }
    }

    /// The published inverse CSR, built on first use.
    fn inverse(&self) -> Result<&Csr> {
        if let Some(inv) = self.inverse.get() {
            return Ok(inv);
        }
        let built = self.csr.invert()?;
        // A racing thread may publish first; either copy is identical.
        let _ = self.inverse.set(built);
        Ok(self.inverse.get().expect("just published"))
    }

    fn read_row(&self, csr: &Csr, n: Node) -> Result<Vec<(Node, Option<FeatureValue>)>> {
        if n < 1 || (n as usize) > csr.rows() {
            return Ok(Vec::new());
        }
        let i = (n - 1) as usize;
        let targets = csr.row(i)?;
        let mut out: Vec<(Node, Option<FeatureValue>)> = match csr.values_row(i)? {
            None => targets
                .iter()
                .map(|t| (t.get(), None))
                .filter(|(t, _)| self.store.in_bounds(*t))
                .collect(),
            Some(ValuesRow::Int(words)) => targets
                .iter()
                .zip(words)
                .map(|(t, w)| (t.get(), self.decode(w.get() as u32)))
                .filter(|(t, _)| self.store.in_bounds(*t))
                .collect(),
            Some(ValuesRow::StrIndex(words)) => targets
                .iter()
                .zip(words)
                .map(|(t, w)| (t.get(), self.decode(w.get())))
                .filter(|(t, _)| self.store.in_bounds(*t))
                .collect(),
        };
        out.sort_by_key(|(t, _)| self.store.rank_of(*t).unwrap_or(u32::MAX));
        Ok(out)
    }

    /// Outgoing edges from a node, canonical order.
    pub fn edges_from(&self, n: Node) -> Result<Vec<(Node, Option<FeatureValue>)>> {
        self.read_row(&self.csr, n)
    }

    /// Incoming edges to a node, canonical order.
    pub fn edges_to(&self, n: Node) -> Result<Vec<(Node, Option<FeatureValue>)>> {
        self.read_row(self.inverse()?, n)
    }

    /// Symmetric closure: edges in either direction. When both directions
    /// carry a value for the same neighbor, the departing edge wins.
    pub fn both(&self, n: Node) -> Result<Vec<(Node, Option<FeatureValue>)>> {
        let forward = self.edges_from(n)?;
        let incoming = self.edges_to(n)?;
        let mut merged: hashbrown::HashMap<Node, Option<FeatureValue>> = incoming
            .into_iter()
            .collect();
        for (t, v) in forward {
            merged.insert(t, v);
        }
        let mut out: Vec<(Node, Option<FeatureValue>)> = merged.into_iter().collect();
        out.sort_by_key(|(t, _)| self.store.rank_of(*t).unwrap_or(u32::MAX));
        Ok(out)
    }

    /// Whether an edge `source -> dest` exists.
    pub fn has(&self, source: Node, dest: Node) -> bool {
        if source < 1 || (source as usize) > self.csr.rows() {
            return false;
        }
        match self.csr.row((source - 1) as usize) {
            Ok(row) => row.binary_search_by(|t| t.get().cmp(&dest)).is_ok(),
            Err(_) => false,
        }
    }

    /// Value on the edge `source -> dest`: `None` if there is no edge or
    /// the edge carries no value.
    pub fn value(&self, source: Node, dest: Node) -> Result<Option<FeatureValue>> {
        if source < 1 || (source as usize) > self.csr.rows() {
            return Ok(None);
        }
        let i = (source - 1) as usize;
        let row = self.csr.row(i)?;
        let Ok(pos) = row.binary_search_by(|t| t.get().cmp(&dest)) else {
            return Ok(None);
        };
        Ok(match self.csr.values_row(i)? {
            None => None,
            Some(ValuesRow::Int(words)) => self.decode(words[pos].get() as u32),
            Some(ValuesRow::StrIndex(words)) => self.decode(words[pos].get()),
        })
    }

    /// For valued features: value histogram, highest counts first. For
    /// valueless features: the total number of edge pairs, as a single
    /// unnamed bucket.
    pub fn freq_list(&self) -> Result<Vec<(Option<FeatureValue>, u64)>> {
        if !self.has_values {
            return Ok(vec![(None, self.csr.len() as u64)]);
        }
        let mut counts: hashbrown::HashMap<Option<FeatureValue>, u64> = hashbrown::HashMap::new();
        for i in 0..self.csr.rows() {
            match self.csr.values_row(i)? {
                None => {}
                Some(ValuesRow::Int(words)) => {
                    for w in words {
                        *counts.entry(self.decode(w.get() as u32)).or_insert(0) += 1;
                    }
                }
                Some(ValuesRow::StrIndex(words)) => {
                    for w in words {
                        *counts.entry(self.decode(w.get())).or_insert(0) += 1;
                    }
                }
            }
        }
        let mut out: Vec<(Option<FeatureValue>, u64)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }
}
