//! # The Join Executor
//!
//! Walks the atoms in spin order, binding one node at a time. At each
//! depth the iteration set starts from the atom's materialized candidates;
//! every narrowing relation to an already-bound atom generates its
//! neighbor set (levUp/levDown row, same-type adjacency) and intersects it
//! in, so a child atom under a bound parent iterates the parent's
//! embeddees rather than the whole candidate list. All relations to bound
//! atoms are then re-verified pairwise, quantifiers run with the binding
//! pinned, and the walk descends.
//!
//! The enumeration is canonical - ascending node order within each depth,
//! atoms in spin order - so a given plan yields a deterministic result
//! sequence and no tuple is produced twice. Tuples reach the sink in
//! template order.
//!
//! Cancellation and the wall-clock budget are checked once per
//! [`CANCEL_BATCH`] candidate visits.

use std::ops::ControlFlow;
use std::time::Instant;

use eyre::Result;
use hashbrown::HashSet;
use smallvec::SmallVec;

use super::spin::{ResolvedQuant, ResolvedTemplate};
use super::CancelFlag;
use crate::config::constants::CANCEL_BATCH;
use crate::error::FabricError;
use crate::storage::Store;
use crate::Node;

/// Shared execution environment: budget, cancellation, visit counter.
pub(crate) struct ExecEnv<'a> {
    pub store: &'a Store,
    pub started: Instant,
    pub deadline: Option<Instant>,
    pub cancel: Option<&'a CancelFlag>,
    visits: std::cell::Cell<usize>,
}

impl<'a> ExecEnv<'a> {
    pub fn new(
        store: &'a Store,
        deadline: Option<Instant>,
        cancel: Option<&'a CancelFlag>,
    ) -> Self {
        ExecEnv {
            store,
            started: Instant::now(),
            deadline,
            cancel,
            visits: std::cell::Cell::new(0),
        }
    }

    /// Cheap per-candidate bookkeeping; the expensive checks run once per
    /// batch.
    fn tick(&self) -> Result<()> {
        let visits = self.visits.get() + 1;
        self.visits.set(visits);
        if visits % CANCEL_BATCH != 0 {
            return Ok(());
        }
        self.check()
    }

    /// Unconditional cancel/budget check, run at every execution entry so
    /// an already-raised flag or spent budget fails before any work.
    fn check(&self) -> Result<()> {
        if let Some(cancel) = self.cancel {
            if cancel.is_cancelled() {
                return Err(FabricError::Cancelled.into());
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(FabricError::Timeout {
                    elapsed_ms: self.started.elapsed().as_millis() as u64,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Runs a resolved template. `pin` fixes atom 0 to one node (quantifier
/// evaluation). The sink sees tuples in template order and may stop the
/// walk early with `ControlFlow::Break`.
pub(crate) fn execute(
    env: &ExecEnv<'_>,
    template: &ResolvedTemplate,
    pin: Option<Node>,
    sink: &mut dyn FnMut(&[Node]) -> ControlFlow<()>,
) -> Result<()> {
    env.check()?;

    // An unsatisfiable atom makes the whole template empty; not an error.
    let pinned_empty = match pin {
        Some(p) => template.candidates[0].binary_search(&p).is_err(),
        None => template.candidates[0].is_empty(),
    };
    if pinned_empty || template.candidates[1..].iter().any(|c| c.is_empty()) {
        return Ok(());
    }
    let mut dfs = Dfs {
        env,
        template,
        pin,
        binding: vec![0; template.atom_count],
        bound: vec![false; template.atom_count],
        sink,
    };
    dfs.descend(0)?;
    Ok(())
}

/// True if the template has at least one match with atom 0 pinned.
pub(crate) fn exists(env: &ExecEnv<'_>, template: &ResolvedTemplate, pin: Node) -> Result<bool> {
    let mut found = false;
    execute(env, template, Some(pin), &mut |_| {
        found = true;
        ControlFlow::Break(())
    })?;
    Ok(found)
}

struct Dfs<'a, 'b> {
    env: &'a ExecEnv<'a>,
    template: &'a ResolvedTemplate,
    pin: Option<Node>,
    binding: Vec<Node>,
    bound: Vec<bool>,
    sink: &'b mut dyn FnMut(&[Node]) -> ControlFlow<()>,
}

impl Dfs<'_, '_> {
    fn descend(&mut self, depth: usize) -> Result<ControlFlow<()>> {
        let template = self.template;
        if depth == template.spin_order.len() {
            return Ok((self.sink)(&self.binding));
        }
        let atom = template.spin_order[depth];

        // Narrowing relations to bound atoms generate candidate sets;
        // intersect them before touching the materialized list.
        let mut generated: Option<Vec<Node>> = None;
        for edge in &template.edges {
            let produced = if edge.left == atom && self.bound[edge.right] {
                edge.op
                    .swap()
                    .candidates_right(self.env.store, self.binding[edge.right])
            } else if edge.right == atom && self.bound[edge.left] {
                edge.op
                    .candidates_right(self.env.store, self.binding[edge.left])
            } else {
                None
            };
            if let Some(mut nodes) = produced {
                nodes.sort_unstable();
                nodes.dedup();
                generated = Some(match generated {
                    None => nodes,
                    Some(prev) => intersect_sorted(&prev, &nodes),
                });
                if generated.as_ref().map_or(false, Vec::is_empty) {
                    return Ok(ControlFlow::Continue(()));
                }
            }
        }

        // The iteration set borrows the materialized list when nothing
        // narrows it; generated sets land in a short-lived buffer.
        let base = &template.candidates[atom];
        let mut narrowed: SmallVec<[Node; 32]> = SmallVec::new();
        let iteration: &[Node] = match (generated, atom, self.pin) {
            (g, 0, Some(p)) => {
                // A pinned atom iterates one node, still subject to its
                // candidate set and any generated narrowing.
                let in_base = base.binary_search(&p).is_ok();
                let in_gen = g.as_ref().map_or(true, |s| s.binary_search(&p).is_ok());
                if in_base && in_gen {
                    narrowed.push(p);
                }
                &narrowed
            }
            (Some(produced), _, _) => {
                narrowed.extend(
                    produced
                        .into_iter()
                        .filter(|n| base.binary_search(n).is_ok()),
                );
                &narrowed
            }
            (None, _, _) => base.as_slice(),
        };

        for &candidate in iteration {
            self.env.tick()?;
            if !self.relations_hold(atom, candidate) {
                continue;
            }
            if !self.quantifiers_hold(atom, candidate)? {
                continue;
            }
            self.binding[atom] = candidate;
            self.bound[atom] = true;
            let flow = self.descend(depth + 1)?;
            self.bound[atom] = false;
            if flow == ControlFlow::Break(()) {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Re-verifies every relation between the candidate and bound atoms.
    fn relations_hold(&self, atom: usize, candidate: Node) -> bool {
        self.template.edges.iter().all(|edge| {
            if edge.left == atom && self.bound[edge.right] {
                edge.op
                    .holds(self.env.store, candidate, self.binding[edge.right])
            } else if edge.right == atom && self.bound[edge.left] {
                edge.op
                    .holds(self.env.store, self.binding[edge.left], candidate)
            } else {
                true
            }
        })
    }

    fn quantifiers_hold(&self, atom: usize, candidate: Node) -> Result<bool> {
        for quant in &self.template.quants[atom] {
            let holds = match quant {
                ResolvedQuant::Without(body) => !exists(self.env, body, candidate)?,
                ResolvedQuant::With(alternatives) => {
                    let mut any = false;
                    for alt in alternatives {
                        if exists(self.env, alt, candidate)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                ResolvedQuant::Where { body, have } => {
                    where_holds(self.env, body, have, candidate)?
                }
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// `/where/ A /have/ B`: every match of the body extends to a match of
/// body+B. Vacuously true when the body has no match.
fn where_holds(
    env: &ExecEnv<'_>,
    body: &ResolvedTemplate,
    have: &ResolvedTemplate,
    pin: Node,
) -> Result<bool> {
    let mut body_tuples: Vec<Vec<Node>> = Vec::new();
    execute(env, body, Some(pin), &mut |tuple| {
        body_tuples.push(tuple.to_vec());
        ControlFlow::Continue(())
    })?;
    if body_tuples.is_empty() {
        return Ok(true);
    }

    // The have-template opens with the same atoms as the body; project its
    // matches onto that prefix.
    let prefix = body.atom_count;
    let mut extended: HashSet<Vec<Node>> = HashSet::new();
    execute(env, have, Some(pin), &mut |tuple| {
        extended.insert(tuple[..prefix].to_vec());
        ControlFlow::Continue(())
    })?;

    Ok(body_tuples.iter().all(|t| extended.contains(t)))
}

fn intersect_sorted(a: &[Node], b: &[Node]) -> Vec<Node> {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .copied()
        .filter(|n| large.binary_search(n).is_ok())
        .collect()
}
