//! # Node Walks
//!
//! Canonical-order traversal. The full walk streams the precomputed order
//! array directly; type-filtered walks clip to the per-type node ranges
//! from `levels` and merge by rank, so a walk over a rare type never scans
//! the whole corpus.

use eyre::Result;

use super::Api;
use crate::error::FabricError;
use crate::Node;

pub struct Nodes<'a> {
    api: &'a Api,
}

impl<'a> Nodes<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Nodes { api }
    }

    /// All nodes in canonical order.
    pub fn walk(&self) -> impl Iterator<Item = Node> + 'a {
        self.api.store().order_slice().iter().map(|v| v.get())
    }

    /// Nodes of the given types, in canonical order.
    pub fn walk_types(&self, types: &[&str]) -> Result<Vec<Node>> {
        let store = self.api.store();
        let meta = store.meta();
        let otype = store.otype_slice();

        let mut nodes: Vec<Node> = Vec::new();
        for tname in types {
            let tid = meta.type_id(tname).ok_or_else(|| {
                eyre::Report::new(FabricError::UnknownType {
                    name: tname.to_string(),
                })
            })?;
            let level = store.level_of(tid).expect("levels parallel to types");
            if level.count == 0 {
                continue;
            }
            // The range may contain interleaved foreign types; the id test
            // keeps this correct for non-contiguous corpora.
            for n in level.min_node..=level.max_node {
                if otype[(n - 1) as usize] == tid {
                    nodes.push(n);
                }
            }
        }
        nodes.sort_by_key(|&n| store.rank_of(n).unwrap_or(u32::MAX));
        Ok(nodes)
    }

    /// Number of nodes of one type.
    pub fn count_type(&self, tname: &str) -> Result<u32> {
        let store = self.api.store();
        let tid = store.meta().type_id(tname).ok_or_else(|| {
            eyre::Report::new(FabricError::UnknownType {
                name: tname.to_string(),
            })
        })?;
        Ok(store.level_of(tid).expect("levels parallel to types").count)
    }
}
