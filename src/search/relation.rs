//! # Structural Relations
//!
//! The twelve relation operators a template can put between two atoms.
//! Lookup goes through a compile-time perfect hash map; evaluation is a
//! pairwise test against the warps, and the narrowing operators can
//! additionally *generate* the candidate set of one endpoint from a bound
//! other endpoint (the joins that make spinning cheap).
//!
//! | Op | Meaning |
//! |----|---------|
//! | `<` / `>` | before / after in canonical order |
//! | `<:` / `:>` | immediately adjacent (no same-type node between) |
//! | `<<` / `>>` | entirely before / after by slot ordering |
//! | `[[` / `]]` | left embeds right / left embedded in right |
//! | `=:` / `:=` | share first slot / share last slot |
//! | `::` | share both boundary slots |
//! | `==` | occupy exactly the same slot set |

use phf::phf_map;

use crate::storage::Store;
use crate::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOp {
    /// `<`: strictly before in canonical order.
    Before,
    /// `>`: strictly after in canonical order.
    After,
    /// `<:`: the next node of the same type.
    AdjBefore,
    /// `:>`: the previous node of the same type.
    AdjAfter,
    /// `<<`: every slot of the left precedes every slot of the right.
    SlotBefore,
    /// `>>`: every slot of the left follows every slot of the right.
    SlotAfter,
    /// `[[`: the left embeds the right.
    Embeds,
    /// `]]`: the left is embedded in the right.
    EmbeddedIn,
    /// `=:`: both start on the same slot.
    SameFirst,
    /// `:=`: both end on the same slot.
    SameLast,
    /// `::`: both boundary slots coincide.
    CoExtensive,
    /// `==`: the slot sets are identical.
    SameSlots,
}

/// Operator spellings, longest spelling matched first by the parser.
pub static RELATION_OPS: phf::Map<&'static str, RelationOp> = phf_map! {
    "<:" => RelationOp::AdjBefore,
    ":>" => RelationOp::AdjAfter,
    "<<" => RelationOp::SlotBefore,
    ">>" => RelationOp::SlotAfter,
    "[[" => RelationOp::Embeds,
    "]]" => RelationOp::EmbeddedIn,
    "=:" => RelationOp::SameFirst,
    ":=" => RelationOp::SameLast,
    "::" => RelationOp::CoExtensive,
    "==" => RelationOp::SameSlots,
    "<" => RelationOp::Before,
    ">" => RelationOp::After,
};

impl RelationOp {
    /// The operator with its endpoints exchanged: `a op b` iff
    /// `b op.swap() a`.
    pub fn swap(self) -> RelationOp {
        match self {
            RelationOp::Before => RelationOp::After,
            RelationOp::After => RelationOp::Before,
            RelationOp::AdjBefore => RelationOp::AdjAfter,
            RelationOp::AdjAfter => RelationOp::AdjBefore,
            RelationOp::SlotBefore => RelationOp::SlotAfter,
            RelationOp::SlotAfter => RelationOp::SlotBefore,
            RelationOp::Embeds => RelationOp::EmbeddedIn,
            RelationOp::EmbeddedIn => RelationOp::Embeds,
            RelationOp::SameFirst
            | RelationOp::SameLast
            | RelationOp::CoExtensive
            | RelationOp::SameSlots => self,
        }
    }

    /// Whether a bound left endpoint generates candidates for the right.
    pub fn narrows(self) -> bool {
        matches!(
            self,
            RelationOp::Embeds
                | RelationOp::EmbeddedIn
                | RelationOp::AdjBefore
                | RelationOp::AdjAfter
        )
    }

    /// Pairwise test: does `a op b` hold?
    pub fn holds(self, store: &Store, a: Node, b: Node) -> bool {
        match self {
            RelationOp::Before => match (store.rank_of(a), store.rank_of(b)) {
                (Some(ra), Some(rb)) => ra < rb,
                _ => false,
            },
            RelationOp::After => RelationOp::Before.holds(store, b, a),
            RelationOp::AdjBefore => store.next_same_type(a) == Some(b),
            RelationOp::AdjAfter => store.prev_same_type(a) == Some(b),
            RelationOp::SlotBefore => match (store.last_slot(a), store.first_slot(b)) {
                (Some(la), Some(fb)) => la < fb,
                _ => false,
            },
            RelationOp::SlotAfter => RelationOp::SlotBefore.holds(store, b, a),
            RelationOp::Embeds => a != b && subset(store, b, a),
            RelationOp::EmbeddedIn => a != b && subset(store, a, b),
            RelationOp::SameFirst => match (store.first_slot(a), store.first_slot(b)) {
                (Some(fa), Some(fb)) => fa == fb,
                _ => false,
            },
            RelationOp::SameLast => match (store.last_slot(a), store.last_slot(b)) {
                (Some(la), Some(lb)) => la == lb,
                _ => false,
            },
            RelationOp::CoExtensive => {
                RelationOp::SameFirst.holds(store, a, b) && RelationOp::SameLast.holds(store, a, b)
            }
            RelationOp::SameSlots => same_slots(store, a, b),
        }
    }

    /// Generates the nodes `b` with `a op b`, for the narrowing operators.
    /// `None` means this operator only tests pairwise.
    pub fn candidates_right(self, store: &Store, a: Node) -> Option<Vec<Node>> {
        match self {
            RelationOp::Embeds => store
                .lev_down(a)
                .ok()
                .map(|row| row.iter().map(|v| v.get()).collect()),
            RelationOp::EmbeddedIn => store
                .lev_up(a)
                .ok()
                .map(|row| row.iter().map(|v| v.get()).collect()),
            RelationOp::AdjBefore => Some(store.next_same_type(a).into_iter().collect()),
            RelationOp::AdjAfter => Some(store.prev_same_type(a).into_iter().collect()),
            _ => None,
        }
    }
}

/// `slots(inner) ⊆ slots(outer)`, with the interval fast path.
fn subset(store: &Store, inner: Node, outer: Node) -> bool {
    let (Ok(inner_slots), Ok(outer_slots)) = (store.slots(inner), store.slots(outer)) else {
        return false;
    };
    inner_slots.subset_of(&outer_slots)
}

/// Exact slot-set equality, gappy-safe.
fn same_slots(store: &Store, a: Node, b: Node) -> bool {
    let (Ok(sa), Ok(sb)) = (store.slots(a), store.slots(b)) else {
        return false;
    };
    if sa.len() != sb.len() || sa.first() != sb.first() || sa.last() != sb.last() {
        return false;
    }
    if sa.is_contiguous() && sb.is_contiguous() {
        return true;
    }
    sa.iter().zip(sb.iter()).all(|(x, y)| x == y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spelling_lookup() {
        assert_eq!(RELATION_OPS.get("<"), Some(&RelationOp::Before));
        assert_eq!(RELATION_OPS.get("]]"), Some(&RelationOp::EmbeddedIn));
        assert_eq!(RELATION_OPS.get("::"), Some(&RelationOp::CoExtensive));
        assert!(RELATION_OPS.get("<>").is_none());
    }

    #[test]
    fn swap_is_involutive() {
        for op in RELATION_OPS.values() {
            assert_eq!(op.swap().swap(), *op);
        }
    }
}
