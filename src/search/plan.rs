//! # Planning
//!
//! Chooses the *spin order*: the sequence in which atoms are bound during
//! the join. The estimate for an atom is `|T| x prod(selectivity)` with
//! selectivities taken from the exact compile-time value histograms
//! (string pools carry per-value counts; int features carry present and
//! distinct counts in the catalog). Estimates only order the join; they
//! never affect the result set.
//!
//! The order is greedy: start from the atom with the lowest estimate, then
//! repeatedly take the cheapest remaining atom, discounting atoms that a
//! bound neighbor can prune through a narrowing relation (an embedding or
//! adjacency edge generates candidates instead of scanning). Ties fall
//! back to template order.

use eyre::Result;

use super::syntax::{Atom, PredTest, RelEdge};
use crate::api::Api;
use crate::config::constants::{BOUND_NEIGHBOR_DISCOUNT, REGEX_SELECTIVITY};

/// Estimated number of candidates for one atom.
pub(crate) fn estimate_atom(api: &Api, atom: &Atom) -> Result<f64> {
    let store = api.store();
    let node_count = store.node_count() as f64;

    let type_count = match &atom.otype {
        Some(tname) => {
            let tid = store.meta().type_id(tname).expect("validated");
            store.level_of(tid).expect("levels parallel to types").count as f64
        }
        None => node_count,
    };
    if type_count == 0.0 {
        return Ok(0.0);
    }

    let mut estimate = type_count;
    for pred in &atom.preds {
        let entry = api.feature_info(&pred.feature)?;
        let handle = api.f(&pred.feature)?;
        let present_ratio = (entry.present as f64 / node_count).clamp(0.0, 1.0);

        let selectivity = match &pred.test {
            PredTest::Eq(raw) => eq_selectivity(&handle, &entry, raw, type_count),
            PredTest::In(raws) => raws
                .iter()
                .map(|r| eq_selectivity(&handle, &entry, r, type_count))
                .sum::<f64>()
                .clamp(0.0, 1.0),
            PredTest::Ne(raw) => (1.0 - eq_selectivity(&handle, &entry, raw, type_count))
                .clamp(0.0, 1.0),
            PredTest::Re(_) => REGEX_SELECTIVITY,
            PredTest::Present => present_ratio,
            PredTest::Absent => 1.0 - present_ratio,
        };
        estimate *= selectivity;
    }
    Ok(estimate)
}

fn eq_selectivity(
    handle: &crate::features::NodeFeature,
    entry: &crate::storage::FeatureEntry,
    raw: &str,
    type_count: f64,
) -> f64 {
    let count = match handle.pool() {
        // Exact per-value count from the compile-time pool.
        Some(pool) => pool.count(raw) as f64,
        // Int features assume a uniform spread over distinct values.
        None => {
            if entry.distinct == 0 {
                0.0
            } else {
                entry.present as f64 / entry.distinct as f64
            }
        }
    };
    (count / type_count).clamp(0.0, 1.0)
}

/// Greedy spin order over the estimates.
pub(crate) fn spin_order(atom_count: usize, edges: &[RelEdge], estimates: &[f64]) -> Vec<usize> {
    let mut order = Vec::with_capacity(atom_count);
    let mut bound = vec![false; atom_count];

    while order.len() < atom_count {
        let mut best: Option<(f64, usize)> = None;
        for i in 0..atom_count {
            if bound[i] {
                continue;
            }
            let prunable = edges.iter().any(|e| {
                e.op.narrows()
                    && ((e.left == i && bound[e.right]) || (e.right == i && bound[e.left]))
            });
            let cost = if prunable {
                estimates[i] * BOUND_NEIGHBOR_DISCOUNT
            } else {
                estimates[i]
            };
            // Strictly-less keeps the tie-break on template order.
            if best.map_or(true, |(c, _)| cost < c) {
                best = Some((cost, i));
            }
        }
        let (_, next) = best.expect("unbound atom remains");
        bound[next] = true;
        order.push(next);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::relation::RelationOp;

    fn edge(left: usize, right: usize, op: RelationOp) -> RelEdge {
        RelEdge { left, right, op }
    }

    #[test]
    fn order_starts_at_lowest_estimate() {
        let order = spin_order(3, &[], &[100.0, 5.0, 50.0]);
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn bound_neighbor_discount_pulls_connected_atoms_forward() {
        // Atom 1 is cheapest; atom 0 embeds atom 1, so once 1 is bound the
        // discounted atom 0 beats the otherwise-cheaper atom 2.
        let edges = vec![edge(1, 0, RelationOp::EmbeddedIn)];
        let order = spin_order(3, &edges, &[300.0, 5.0, 50.0]);
        assert_eq!(order, vec![1, 0, 2]);
    }

    #[test]
    fn template_order_breaks_ties() {
        let order = spin_order(3, &[], &[10.0, 10.0, 10.0]);
        assert_eq!(order, vec![0, 1, 2]);
    }
}
