//! # Warp Precomputation
//!
//! Derives the structural indices from `otype` and `oslots`:
//!
//! 1. `boundary` - first and last slot per node
//! 2. `order` / `rank` - the canonical total order and its inverse
//! 3. `levels` - the type table in level order with per-type node ranges
//! 4. `levUp` - per node, every node whose slot set contains it
//! 5. `levDown` - the exact inverse of `levUp`
//!
//! ## Canonical order
//!
//! Nodes compare by `(first_slot, -span, level_index(type), node)`. The
//! consequences: outer containers precede their contents; same-start nodes
//! go widest first; same-span nodes follow the type hierarchy; the order is
//! total and stable across compilations.
//!
//! ## Embedding computation
//!
//! `levUp` candidates come from the slot-level containment index (every
//! container of a node must contain its first slot). A candidate is
//! confirmed by interval arithmetic when its slot set is contiguous, and by
//! a full sorted-list sweep when it is gappy. Entries are ordered widest
//! span first, then rank ascending.

use std::collections::BTreeMap;

use tracing::debug;

use super::CorpusSource;
use crate::Node;

/// Everything derived from the two warp members.
#[derive(Debug)]
pub struct Precomputed {
    /// Type names in level order; index is the type id.
    pub type_order: Vec<String>,
    /// Type id per node, `1..=N` at index `node - 1`.
    pub otype_ids: Vec<u8>,
    /// Per type id: `(min_node, max_node, count)`.
    pub levels: Vec<(Node, Node, u32)>,
    /// First slot per node.
    pub first_slot: Vec<Node>,
    /// Last slot per node.
    pub last_slot: Vec<Node>,
    /// Canonical order: position -> node.
    pub order: Vec<Node>,
    /// Canonical rank: `rank[node - 1]` is the 1-based position.
    pub rank: Vec<u32>,
    /// Embedders per node, widest first then rank ascending.
    pub lev_up: Vec<Vec<Node>>,
    /// Embeddees per node, rank ascending.
    pub lev_down: Vec<Vec<Node>>,
}

pub fn precompute(source: &CorpusSource) -> Precomputed {
    let s = source.slot_count as usize;
    let n = source.node_count() as usize;

    // Type statistics: total span and population per type name.
    let mut stats: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    stats.insert(source.slot_type.as_str(), (s as u64, s as u64));
    for (i, tname) in source.node_types.iter().enumerate() {
        let entry = stats.entry(tname.as_str()).or_insert((0, 0));
        entry.0 += source.oslots[i].len() as u64;
        entry.1 += 1;
    }

    // Level order: average span descending, name ascending on ties. More
    // embedding types come first; the slot type lands at the bottom.
    let mut type_order: Vec<&str> = stats.keys().copied().collect();
    type_order.sort_by(|a, b| {
        let (sa, ca) = stats[a];
        let (sb, cb) = stats[b];
        let avg_a = sa as f64 / ca as f64;
        let avg_b = sb as f64 / cb as f64;
        avg_b
            .partial_cmp(&avg_a)
            .expect("averages are finite")
            .then_with(|| a.cmp(b))
    });
    let type_id: BTreeMap<&str, u8> = type_order
        .iter()
        .enumerate()
        .map(|(i, t)| (*t, i as u8))
        .collect();
    debug!(types = ?type_order, "level order");

    let slot_tid = type_id[source.slot_type.as_str()];
    let mut otype_ids = vec![slot_tid; n];
    for (i, tname) in source.node_types.iter().enumerate() {
        otype_ids[s + i] = type_id[tname.as_str()];
    }

    // Boundaries. Slots bound themselves.
    let mut first_slot = vec![0u32; n];
    let mut last_slot = vec![0u32; n];
    let mut span = vec![1u32; n];
    for slot in 1..=s as u32 {
        first_slot[(slot - 1) as usize] = slot;
        last_slot[(slot - 1) as usize] = slot;
    }
    for (i, slots) in source.oslots.iter().enumerate() {
        first_slot[s + i] = slots[0];
        last_slot[s + i] = *slots.last().expect("validated non-empty");
        span[s + i] = slots.len() as u32;
    }

    // Canonical order and its inverse.
    let mut order: Vec<Node> = (1..=n as Node).collect();
    order.sort_by_key(|&node| {
        let i = (node - 1) as usize;
        (
            first_slot[i],
            std::cmp::Reverse(span[i]),
            otype_ids[i],
            node,
        )
    });
    let mut rank = vec![0u32; n];
    for (pos, &node) in order.iter().enumerate() {
        rank[(node - 1) as usize] = pos as u32 + 1;
    }

    // Per-type node ranges.
    let mut levels: Vec<(Node, Node, u32)> = vec![(Node::MAX, 0, 0); type_order.len()];
    for (i, &tid) in otype_ids.iter().enumerate() {
        let node = i as Node + 1;
        let entry = &mut levels[tid as usize];
        entry.0 = entry.0.min(node);
        entry.1 = entry.1.max(node);
        entry.2 += 1;
    }

    // Slot-level containment: up[slot] = non-slot nodes containing it.
    let mut slot_up: Vec<Vec<Node>> = vec![Vec::new(); s];
    for (i, slots) in source.oslots.iter().enumerate() {
        let m = (s + i) as Node + 1;
        for &slot in slots {
            slot_up[(slot - 1) as usize].push(m);
        }
    }

    // levUp: for slots, the containment index is the answer. For non-slot
    // nodes, containers of the first slot are the candidate set; confirm by
    // interval test or, for gappy candidates, a sorted-list sweep.
    let mut lev_up: Vec<Vec<Node>> = Vec::with_capacity(n);
    for node in 1..=n as Node {
        let i = (node - 1) as usize;
        let mut ups: Vec<Node> = if node <= s as Node {
            slot_up[i].clone()
        } else {
            let candidates = &slot_up[(first_slot[i] - 1) as usize];
            let my_slots = &source.oslots[i - s];
            candidates
                .iter()
                .copied()
                .filter(|&m| m != node)
                .filter(|&m| {
                    let mi = (m - 1) as usize;
                    if first_slot[mi] > first_slot[i] || last_slot[mi] < last_slot[i] {
                        return false;
                    }
                    let m_slots = &source.oslots[mi - s];
                    if m_slots.len() as u32 == last_slot[mi] - first_slot[mi] + 1 {
                        // Contiguous container: the interval test suffices.
                        true
                    } else {
                        subset_sorted(my_slots, m_slots)
                    }
                })
                .collect()
        };
        ups.sort_by_key(|&m| {
            let mi = (m - 1) as usize;
            (std::cmp::Reverse(span[mi]), rank[mi])
        });
        lev_up.push(ups);
    }

    // levDown is the exact inverse, rank ascending.
    let mut lev_down: Vec<Vec<Node>> = vec![Vec::new(); n];
    for (i, ups) in lev_up.iter().enumerate() {
        let node = i as Node + 1;
        for &m in ups {
            lev_down[(m - 1) as usize].push(node);
        }
    }
    for row in &mut lev_down {
        row.sort_by_key(|&d| rank[(d - 1) as usize]);
    }

    Precomputed {
        type_order: type_order.into_iter().map(String::from).collect(),
        otype_ids,
        levels,
        first_slot,
        last_slot,
        order,
        rank,
        lev_up,
        lev_down,
    }
}

/// True if every element of `a` occurs in `b`; both ascending.
fn subset_sorted(a: &[Node], b: &[Node]) -> bool {
    let mut bi = b.iter();
    'outer: for &x in a {
        for &y in bi.by_ref() {
            match y.cmp(&x) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => continue 'outer,
                std::cmp::Ordering::Greater => return false,
            }
        }
        return false;
    }
    true
}
