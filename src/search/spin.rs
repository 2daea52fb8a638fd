//! # Atom Materialization
//!
//! "Spinning" starts by giving every atom its initial candidate set:
//! the contiguous type range from `levels`, narrowed by each feature
//! predicate through the vectorized bulk filters. Only regex predicates
//! fall back to scalar evaluation, and they run last, over the survivors
//! of the cheap filters.
//!
//! Resolution also validates every name against the corpus (unknown type
//! or feature names fail with `UnknownName` before any planning) and
//! compiles the quantifier sub-templates recursively.

use eyre::Result;
use regex::Regex;

use super::plan::{estimate_atom, spin_order};
use super::syntax::{Atom, PredTest, Quantifier, RelEdge, Template};
use crate::api::Api;
use crate::error::{FabricError, NameKind};
use crate::features::FeatureValue;
use crate::storage::ValueType;
use crate::Node;

/// A template resolved against one corpus: validated names, chosen spin
/// order, materialized candidates, compiled quantifiers.
#[derive(Debug)]
pub(crate) struct ResolvedTemplate {
    pub atom_count: usize,
    pub edges: Vec<RelEdge>,
    pub spin_order: Vec<usize>,
    /// Candidate nodes per atom, ascending.
    pub candidates: Vec<Vec<Node>>,
    /// Quantifiers per atom.
    pub quants: Vec<Vec<ResolvedQuant>>,
}

#[derive(Debug)]
pub(crate) enum ResolvedQuant {
    Without(Box<ResolvedTemplate>),
    Where {
        body: Box<ResolvedTemplate>,
        have: Box<ResolvedTemplate>,
    },
    With(Vec<ResolvedTemplate>),
}

pub(crate) fn resolve(api: &Api, template: &Template) -> Result<ResolvedTemplate> {
    // Validate all names first: planning must not start with unknowns.
    for atom in &template.atoms {
        validate_atom(api, atom)?;
    }

    let estimates: Vec<f64> = template
        .atoms
        .iter()
        .map(|a| estimate_atom(api, a))
        .collect::<Result<_>>()?;
    let order = spin_order(template.atoms.len(), &template.edges, &estimates);

    let mut candidates = Vec::with_capacity(template.atoms.len());
    for atom in &template.atoms {
        candidates.push(materialize_atom(api, atom)?);
    }

    let mut quants = Vec::with_capacity(template.atoms.len());
    for atom in &template.atoms {
        let mut resolved = Vec::new();
        for quant in &atom.quants {
            resolved.push(match quant {
                Quantifier::Without(body) => {
                    ResolvedQuant::Without(Box::new(resolve(api, body)?))
                }
                Quantifier::Where { body, have } => ResolvedQuant::Where {
                    body: Box::new(resolve(api, body)?),
                    have: Box::new(resolve(api, have)?),
                },
                Quantifier::With(alternatives) => ResolvedQuant::With(
                    alternatives
                        .iter()
                        .map(|t| resolve(api, t))
                        .collect::<Result<_>>()?,
                ),
            });
        }
        quants.push(resolved);
    }

    Ok(ResolvedTemplate {
        atom_count: template.atoms.len(),
        edges: template.edges.clone(),
        spin_order: order,
        candidates,
        quants,
    })
}

fn validate_atom(api: &Api, atom: &Atom) -> Result<()> {
    let meta = api.store().meta();
    if let Some(tname) = &atom.otype {
        if meta.type_id(tname).is_none() {
            return Err(FabricError::UnknownName {
                kind: NameKind::Type,
                name: tname.clone(),
            }
            .into());
        }
    }
    for pred in &atom.preds {
        // Atom predicates test node features; an edge feature here is as
        // unknown as a misspelling.
        let is_node_feature = meta
            .features
            .get(&pred.feature)
            .map_or(false, |e| e.kind == crate::storage::FeatureKind::Node);
        if !is_node_feature {
            return Err(FabricError::UnknownName {
                kind: NameKind::Feature,
                name: pred.feature.clone(),
            }
            .into());
        }
        if let PredTest::Re(pattern) = &pred.test {
            // Surface a bad regex as a parse diagnostic at its position.
            if let Err(e) = Regex::new(pattern) {
                return Err(FabricError::TemplateParse {
                    line: pred.line,
                    col: pred.col,
                    expected: "a valid regular expression".to_string(),
                    found: format!("{pattern} ({e})"),
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Converts a template literal to a typed comparand for one feature.
/// `None` means the literal can never match (e.g. a non-numeric literal
/// against an int feature).
fn convert(value_type: ValueType, raw: &str) -> Option<FeatureValue> {
    match value_type {
        ValueType::Int => raw.parse::<i32>().ok().map(FeatureValue::Int),
        ValueType::Str => Some(FeatureValue::Str(raw.to_string())),
    }
}

/// The initial candidate set of one atom: type range, then predicates.
fn materialize_atom(api: &Api, atom: &Atom) -> Result<Vec<Node>> {
    let store = api.store();

    let mut nodes: Vec<Node> = match &atom.otype {
        Some(tname) => {
            let tid = store.meta().type_id(tname).expect("validated");
            let level = store.level_of(tid).expect("levels parallel to types");
            let otype = store.otype_slice();
            (level.min_node..=level.max_node)
                .filter(|&n| otype[(n - 1) as usize] == tid)
                .collect()
        }
        None => (1..=store.node_count()).collect(),
    };

    for pred in &atom.preds {
        if nodes.is_empty() {
            break;
        }
        let handle = api.f(&pred.feature)?;
        nodes = match &pred.test {
            PredTest::Eq(raw) => match convert(handle.value_type(), raw) {
                Some(v) => handle.filter_eq(&nodes, &v),
                None => Vec::new(),
            },
            PredTest::Ne(raw) => match convert(handle.value_type(), raw) {
                Some(v) => handle.filter_ne(&nodes, &v),
                // A literal that cannot be a value differs from every
                // value; present cells all qualify.
                None => handle.filter_present(&nodes),
            },
            PredTest::In(raws) => {
                let values: Vec<FeatureValue> = raws
                    .iter()
                    .filter_map(|r| convert(handle.value_type(), r))
                    .collect();
                handle.filter_in(&nodes, &values)
            }
            PredTest::Re(pattern) => {
                let re = Regex::new(pattern).expect("validated");
                nodes
                    .into_iter()
                    .filter(|&n| match handle.str_value(n) {
                        Some(s) => re.is_match(s),
                        None => handle
                            .value(n)
                            .map(|v| re.is_match(&v.to_string()))
                            .unwrap_or(false),
                    })
                    .collect()
            }
            PredTest::Present => handle.filter_present(&nodes),
            PredTest::Absent => handle.filter_absent(&nodes),
        };
    }

    Ok(nodes)
}
