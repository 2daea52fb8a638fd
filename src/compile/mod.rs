//! # Corpus Compiler
//!
//! One-shot conversion of an in-memory corpus description into the binary
//! store format. The importer that produces a [`CorpusSource`] from
//! human-readable feature files is an external collaborator; this module
//! owns everything after that hand-off:
//!
//! 1. **Validation** - the containment map must cover every non-slot node
//!    with an ascending, duplicate-free slot list, and feature data must
//!    match its declared value type
//! 2. **Precomputation** - canonical order, rank, per-type levels, the two
//!    embedding relations and slot boundaries ([`precompute`])
//! 3. **Emission** - little-endian arrays with checksums, `meta.json`
//!    written last so a half-written directory is never mistaken for a
//!    store ([`writer`])
//!
//! Compilation is deterministic: identical input produces byte-identical
//! output. The cost is deliberately front-loaded; the store is compiled
//! once and opened many times.

pub mod precompute;
pub mod writer;

use std::collections::BTreeMap;

use eyre::{ensure, Result};
use tracing::warn;

use crate::error::FabricError;
use crate::features::FeatureValue;
use crate::storage::{SectionConfig, ValueType, MISSING_INT, NONE_INT_VALUE};
use crate::Node;

pub use writer::compile;

/// A node feature to be compiled: a partial map node -> value.
#[derive(Debug, Clone)]
pub struct NodeFeatureSource {
    pub value_type: ValueType,
    pub description: String,
    pub values: BTreeMap<Node, FeatureValue>,
}

/// An edge feature to be compiled: source -> target -> optional value.
#[derive(Debug, Clone)]
pub struct EdgeFeatureSource {
    pub has_values: bool,
    pub value_type: ValueType,
    pub description: String,
    pub edges: BTreeMap<Node, BTreeMap<Node, Option<FeatureValue>>>,
}

/// Everything the compiler needs to build a corpus version.
///
/// Nodes are implied by the two warp members: slots are `1..=slot_count`,
/// non-slot nodes are `slot_count+1..=slot_count+node_types.len()`, with
/// `node_types[i]` and `oslots[i]` describing node `slot_count + 1 + i`.
#[derive(Debug, Clone, Default)]
pub struct CorpusSource {
    pub slot_type: String,
    pub slot_count: u32,
    /// Type name per non-slot node.
    pub node_types: Vec<String>,
    /// Ascending slot list per non-slot node.
    pub oslots: Vec<Vec<Node>>,
    pub node_features: BTreeMap<String, NodeFeatureSource>,
    pub edge_features: BTreeMap<String, EdgeFeatureSource>,
    pub text_formats: BTreeMap<String, String>,
    pub default_format: Option<String>,
    pub sections: Option<SectionConfig>,
}

impl CorpusSource {
    pub fn node_count(&self) -> Node {
        self.slot_count + self.node_types.len() as Node
    }

    /// Structural validation ahead of precomputation. Every defect here is
    /// an importer bug; failing loudly beats compiling a corpus that will
    /// misbehave under traversal.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.slot_count > 0, "corpus has no slots");
        ensure!(!self.slot_type.is_empty(), "slot type name is empty");
        ensure!(
            self.node_types.len() == self.oslots.len(),
            "{} node types but {} oslots rows",
            self.node_types.len(),
            self.oslots.len()
        );

        for (i, slots) in self.oslots.iter().enumerate() {
            let node = self.slot_count + 1 + i as Node;
            ensure!(!slots.is_empty(), "node {node} covers no slots");
            ensure!(
                slots.windows(2).all(|w| w[0] < w[1]),
                "node {node}: slot list not ascending and duplicate-free"
            );
            let last = *slots.last().expect("non-empty");
            ensure!(
                slots[0] >= 1 && last <= self.slot_count,
                "node {node}: slots {}..{} outside 1..={}",
                slots[0],
                last,
                self.slot_count
            );
        }

        for (name, feat) in &self.node_features {
            for (&node, value) in &feat.values {
                ensure!(node >= 1, "feature '{name}': node 0 is not a node");
                check_value_type(name, feat.value_type, value)?;
            }
            // Sentinel collisions are silently unreadable after compilation,
            // so they get a loud warning here.
            if feat.value_type == ValueType::Int
                && feat
                    .values
                    .values()
                    .any(|v| matches!(v, FeatureValue::Int(i) if *i == MISSING_INT))
            {
                warn!(
                    feature = %name,
                    sentinel = MISSING_INT,
                    "node feature contains the absence sentinel; those cells will read as absent"
                );
            }
        }

        for (name, feat) in &self.edge_features {
            for (&source, targets) in &feat.edges {
                ensure!(source >= 1, "edge feature '{name}': node 0 is not a node");
                for (&target, value) in targets {
                    ensure!(target >= 1, "edge feature '{name}': node 0 is not a node");
                    match value {
                        Some(v) => {
                            ensure!(
                                feat.has_values,
                                "edge feature '{name}' carries a value on ({source},{target}) but has_values is false"
                            );
                            check_value_type(name, feat.value_type, v)?;
                        }
                        None => {}
                    }
                }
            }
            if feat.has_values
                && feat.value_type == ValueType::Int
                && feat.edges.values().flat_map(|t| t.values()).any(
                    |v| matches!(v, Some(FeatureValue::Int(i)) if *i == NONE_INT_VALUE),
                )
            {
                warn!(
                    feature = %name,
                    sentinel = NONE_INT_VALUE,
                    "edge feature contains the no-value sentinel; those edges will read as valueless"
                );
            }
        }

        if let Some(sections) = &self.sections {
            ensure!(
                sections.types.len() == sections.features.len(),
                "section types and features differ in length"
            );
        }
        Ok(())
    }
}

fn check_value_type(name: &str, declared: ValueType, value: &FeatureValue) -> Result<()> {
    let ok = matches!(
        (declared, value),
        (ValueType::Int, FeatureValue::Int(_)) | (ValueType::Str, FeatureValue::Str(_))
    );
    ensure!(
        ok,
        FabricError::corrupt(format!(
            "feature '{name}': value {value:?} does not match declared type {declared:?}"
        ))
    );
    Ok(())
}
