//! # The Fabric Handle
//!
//! [`Fabric`] owns one open corpus: the backing [`Store`], the immutable
//! [`Config`] read at open, and the publish-once caches of materialized
//! feature handles and parsed text formats. It is the unit of sharing -
//! wrap it in an `Arc`, hand clones to as many threads as needed, and every
//! operator and feature handle derived from it stays valid until the last
//! reference drops.
//!
//! Feature materialization is lazy: `load` with an empty spec opens the
//! store and nothing else; the first access to a feature maps its file,
//! loads its pool if any, and publishes the handle under a double-checked
//! write lock. Once published, reads are lock-free until the check itself
//! (a read-lock acquisition on an uncontended `RwLock`).

use std::path::Path;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::api::{Api, TextFormat};
use crate::config::Config;
use crate::error::FabricError;
use crate::features::{EdgeFeature, NodeFeature};
use crate::storage::{Csr, FeatureKind, I32Array, Store, StringPool, U32Array, ValueType};

/// Which features to materialize eagerly at load.
#[derive(Debug, Clone)]
pub enum FeatureSpec {
    /// Everything in the catalog.
    All,
    /// An explicit set; unknown names fail with `UnknownFeature`.
    Named(Vec<String>),
    /// Nothing eagerly; handles materialize on first access.
    None,
}

#[derive(Debug)]
pub struct Fabric {
    store: Arc<Store>,
    config: Config,
    node_features: RwLock<HashMap<String, Arc<NodeFeature>>>,
    edge_features: RwLock<HashMap<String, Arc<EdgeFeature>>>,
    formats: RwLock<HashMap<String, Arc<TextFormat>>>,
}

impl Fabric {
    /// Opens the highest compiled version of a corpus with configuration
    /// from the environment.
    pub fn open(corpus_dir: impl AsRef<Path>) -> Result<Arc<Fabric>> {
        Self::open_with(corpus_dir, None, Config::from_env())
    }

    /// Opens a specific version with an explicit configuration.
    pub fn open_with(
        corpus_dir: impl AsRef<Path>,
        version: Option<u32>,
        config: Config,
    ) -> Result<Arc<Fabric>> {
        let store = Store::open(corpus_dir.as_ref(), version, config.embedding_cache)
            .wrap_err_with(|| {
                format!("failed to open corpus '{}'", corpus_dir.as_ref().display())
            })?;
        Ok(Arc::new(Fabric {
            store: Arc::new(store),
            config,
            node_features: RwLock::new(HashMap::new()),
            edge_features: RwLock::new(HashMap::new()),
            formats: RwLock::new(HashMap::new()),
        }))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Materializes features per `spec` and returns the operator facade.
    pub fn load(self: &Arc<Self>, spec: FeatureSpec) -> Result<Api> {
        match spec {
            FeatureSpec::None => {}
            FeatureSpec::All => {
                let names: Vec<String> = self.store.meta().features.keys().cloned().collect();
                info!(features = names.len(), "loading all features");
                for name in names {
                    self.materialize(&name)?;
                }
            }
            FeatureSpec::Named(names) => {
                for name in &names {
                    // Unknown names fail before any mapping happens.
                    self.store.meta().feature(name)?;
                }
                for name in &names {
                    self.materialize(name)?;
                }
            }
        }
        Ok(Api::new(self.clone()))
    }

    fn materialize(&self, name: &str) -> Result<()> {
        match self.store.meta().feature(name)?.kind {
            FeatureKind::Node => self.node_feature(name).map(|_| ()),
            FeatureKind::Edge => self.edge_feature(name).map(|_| ()),
        }
    }

    /// Node feature handle, materialized on first access.
    pub fn node_feature(&self, name: &str) -> Result<Arc<NodeFeature>> {
        if let Some(handle) = self.node_features.read().get(name) {
            return Ok(handle.clone());
        }

        let entry = self.store.meta().feature(name)?.clone();
        if entry.kind != FeatureKind::Node {
            return Err(eyre::Report::new(FabricError::UnknownFeature {
                name: name.to_string(),
            })
            .wrap_err(format!("'{name}' is an edge feature, not a node feature")));
        }

        let path = self.store.feature_file(name)?;
        debug!(feature = %name, path = %path.display(), "materializing node feature");
        let backing = self.store.map_rel(&entry.path)?;
        let handle = match entry.value_type {
            ValueType::Int => {
                let values = I32Array::open(backing)
                    .wrap_err_with(|| format!("while opening feature '{name}'"))?;
                Arc::new(NodeFeature::new_int(
                    name.to_string(),
                    self.store.clone(),
                    values,
                ))
            }
            ValueType::Str => {
                let indices = U32Array::open(backing)
                    .wrap_err_with(|| format!("while opening feature '{name}'"))?;
                let pool_path = path.with_extension("pool.json");
                let pool = Arc::new(StringPool::load(&pool_path)?);
                Arc::new(NodeFeature::new_str(
                    name.to_string(),
                    self.store.clone(),
                    indices,
                    pool,
                ))
            }
        };

        let mut cache = self.node_features.write();
        // A racing thread may have published while we materialized; keep
        // the first published handle so every caller shares one.
        Ok(cache
            .entry(name.to_string())
            .or_insert(handle)
            .clone())
    }

    /// Edge feature handle, materialized on first access.
    pub fn edge_feature(&self, name: &str) -> Result<Arc<EdgeFeature>> {
        if let Some(handle) = self.edge_features.read().get(name) {
            return Ok(handle.clone());
        }

        let entry = self.store.meta().feature(name)?.clone();
        if entry.kind != FeatureKind::Edge {
            return Err(eyre::Report::new(FabricError::UnknownFeature {
                name: name.to_string(),
            })
            .wrap_err(format!("'{name}' is a node feature, not an edge feature")));
        }

        let path = self.store.feature_file(name)?;
        debug!(feature = %name, path = %path.display(), "materializing edge feature");
        let backing = self.store.map_rel(&entry.path)?;
        let csr =
            Csr::open(backing).wrap_err_with(|| format!("while opening edge feature '{name}'"))?;
        let pool = if entry.has_values && entry.value_type == ValueType::Str {
            let pool_path = path.with_extension("pool.json");
            Some(Arc::new(StringPool::load(&pool_path)?))
        } else {
            None
        };
        let handle = Arc::new(EdgeFeature::new(
            name.to_string(),
            self.store.clone(),
            csr,
            pool,
            entry.has_values,
        ));

        let mut cache = self.edge_features.write();
        Ok(cache
            .entry(name.to_string())
            .or_insert(handle)
            .clone())
    }

    /// Parsed text format, cached per fabric.
    pub fn text_format(&self, name: &str) -> Result<Arc<TextFormat>> {
        if let Some(format) = self.formats.read().get(name) {
            return Ok(format.clone());
        }

        let source = self
            .store
            .meta()
            .text_formats
            .get(name)
            .ok_or_else(|| {
                eyre::Report::new(FabricError::UnknownFormat {
                    name: name.to_string(),
                })
            })?
            .clone();
        let parsed = Arc::new(TextFormat::parse(&source)?);

        let mut cache = self.formats.write();
        Ok(cache.entry(name.to_string()).or_insert(parsed).clone())
    }

    /// Names of the features currently materialized.
    pub fn loaded_features(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .node_features
            .read()
            .keys()
            .chain(self.edge_features.read().keys())
            .cloned()
            .collect();
        names.sort();
        names
    }
}
