//! # The Public API Facade
//!
//! [`Api`] is what `Fabric::load` hands back: the six operator objects over
//! one corpus. The operators are stateless views holding a shared reference
//! to the fabric; creating them is free and they may be used from any
//! thread concurrently - all post-load state is immutable.
//!
//! | Operator | Accessor | Concern |
//! |----------|----------|---------|
//! | N | [`Api::n`] | canonical node walks |
//! | F | [`Api::f`] | node feature handles |
//! | E | [`Api::e`] | edge feature handles |
//! | L | [`Api::l`] | locality: embedders, embeddees, neighbors |
//! | T | [`Api::t`] | text assembly and sections |
//! | S | [`Api::s`] | SPIN pattern search |

mod locality;
mod nodes;
mod text;

pub use locality::Locality;
pub use nodes::Nodes;
pub use text::{SectionRef, Text, TextFormat};

use std::sync::Arc;

use eyre::Result;
use serde::Serialize;

use crate::fabric::Fabric;
use crate::features::{EdgeFeature, NodeFeature};
use crate::search::Search;
use crate::storage::{FeatureEntry, FeatureKind, Store};

/// The operator facade over one loaded corpus.
#[derive(Clone, Debug)]
pub struct Api {
    fabric: Arc<Fabric>,
}

impl Api {
    pub(crate) fn new(fabric: Arc<Fabric>) -> Self {
        Api { fabric }
    }

    pub fn fabric(&self) -> &Arc<Fabric> {
        &self.fabric
    }

    pub fn store(&self) -> &Arc<Store> {
        self.fabric.store()
    }

    /// The N operator: node walks in canonical order.
    pub fn n(&self) -> Nodes<'_> {
        Nodes::new(self)
    }

    /// The L operator: structural locality.
    pub fn l(&self) -> Locality<'_> {
        Locality::new(self)
    }

    /// The T operator: text assembly and section resolution.
    pub fn t(&self) -> Text<'_> {
        Text::new(self)
    }

    /// The S operator: SPIN pattern search.
    pub fn s(&self) -> Search<'_> {
        Search::new(self)
    }

    /// The F operator: a node feature handle, materialized on first access
    /// and cached for the lifetime of the fabric.
    pub fn f(&self, name: &str) -> Result<Arc<NodeFeature>> {
        self.fabric.node_feature(name)
    }

    /// The E operator: an edge feature handle.
    pub fn e(&self, name: &str) -> Result<Arc<EdgeFeature>> {
        self.fabric.edge_feature(name)
    }

    /// Catalog entry of a feature, without materializing it.
    pub fn feature_info(&self, name: &str) -> Result<FeatureEntry> {
        Ok(self.store().meta().feature(name)?.clone())
    }

    /// Corpus summary for discovery surfaces.
    pub fn describe(&self) -> CorpusInfo {
        let store = self.store();
        let meta = store.meta();
        let types = meta
            .types
            .iter()
            .zip(store.levels())
            .map(|(t, level)| TypeInfo {
                name: t.name.clone(),
                count: level.count,
                min_node: level.min_node,
                max_node: level.max_node,
            })
            .collect();
        let (mut node_features, mut edge_features) = (Vec::new(), Vec::new());
        for (name, entry) in &meta.features {
            match entry.kind {
                FeatureKind::Node => node_features.push(name.clone()),
                FeatureKind::Edge => edge_features.push(name.clone()),
            }
        }
        CorpusInfo {
            path: store.dir().display().to_string(),
            version: store.version(),
            slot_type: meta.slot_type.clone(),
            node_count: meta.node_count,
            slot_count: meta.slot_count,
            types,
            node_features,
            edge_features,
            section_types: meta
                .sections
                .as_ref()
                .map(|s| s.types.clone())
                .unwrap_or_default(),
            text_formats: meta.text_formats.keys().cloned().collect(),
        }
    }
}

/// Discovery projection of one corpus.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusInfo {
    pub path: String,
    pub version: u32,
    pub slot_type: String,
    pub node_count: u32,
    pub slot_count: u32,
    pub types: Vec<TypeInfo>,
    pub node_features: Vec<String>,
    pub edge_features: Vec<String>,
    pub section_types: Vec<String>,
    pub text_formats: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeInfo {
    pub name: String,
    pub count: u32,
    pub min_node: u32,
    pub max_node: u32,
}
