//! # Context-Fabric - Corpus Storage and Pattern Search
//!
//! Context-Fabric is a storage and query engine for annotated text corpora
//! modeled as typed, hierarchical graphs. A corpus holds millions of *nodes*
//! (words, phrases, clauses, verses, books) related by containment and
//! labeled edges, with typed key/value *features* on nodes and edges. This
//! crate implements:
//!
//! - **Zero-copy corpus access**: compiled corpora are directories of raw
//!   little-endian arrays, mapped read-only and paged lazily by the OS
//! - **Vectorized feature filtering**: bulk predicates run one element-wise
//!   pass over contiguous memory, no per-node dispatch
//! - **Precomputed structure**: canonical order, per-type ranges and the two
//!   CSR-encoded embedding relations are built once at compile time
//!
//! ## Quick Start
//!
//! ```ignore
//! use context_fabric::{Fabric, FeatureSpec};
//!
//! let fabric = Fabric::open("./bhsa")?;
//! let api = fabric.load(FeatureSpec::All)?;
//!
//! let outcome = api.s().search(
//!     "clause\n  phrase function=Pred\n    word sp=verb",
//!     context_fabric::ReturnType::Results,
//!     &Default::default(),
//! )?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │     Public API (Fabric / Api)        │
//! ├─────────────────────────────────────┤
//! │  SPIN Search (Parser/Planner/Exec)   │
//! ├──────────────────┬──────────────────┤
//! │  Navigation      │  Result Cache    │
//! │  (N / L / T)     │  (TTL, cursors)  │
//! ├──────────────────┴──────────────────┤
//! │  Feature Backends (int / str / edge) │
//! ├─────────────────────────────────────┤
//! │  Warps (order, rank, levUp, levDown) │
//! ├─────────────────────────────────────┤
//! │  Storage Layer (mmap arrays + CSR)   │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Corpus Layout
//!
//! A compiled corpus is a versioned directory of raw arrays:
//!
//! ```text
//! corpus_dir/
//! └── v1/
//!     ├── meta.json            # dimensions, type table, feature catalog
//!     ├── warp/                # structural indices
//!     │   ├── otype.bin        # node -> type id
//!     │   ├── oslots.csr       # non-slot node -> covered slots
//!     │   ├── order.bin        # canonical walk order
//!     │   ├── rank.bin         # inverse of order
//!     │   ├── levels.bin       # per-type node ranges
//!     │   ├── levUp.csr        # node -> embedders
//!     │   ├── levDown.csr      # node -> embeddees
//!     │   └── boundary.bin     # first/last slot per node
//!     ├── features/            # one file per node feature
//!     └── edges/               # one CSR per edge feature
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: memory-mapped arrays, CSR views, string pools, the store
//! - [`compile`]: one-shot corpus compiler and warp precomputation
//! - [`features`]: node and edge feature backends with bulk filters
//! - [`api`]: the N / L / T operator objects
//! - [`search`]: SPIN template parser, planner and executor
//! - [`cache`]: keyed result cache for server integration

#[macro_use]
mod macros;

pub mod api;
pub mod cache;
pub mod compile;
pub mod config;
pub mod error;
pub mod features;
pub mod search;
pub mod storage;

mod fabric;

pub use api::Api;
pub use config::Config;
pub use error::FabricError;
pub use fabric::{Fabric, FeatureSpec};
pub use features::FeatureValue;
pub use search::{CancelFlag, ReturnType, SearchOptions, SearchOutcome};

/// Node identifier. Nodes are 1-based: slots occupy `1..=slot_count`,
/// non-slot nodes occupy `slot_count+1..=node_count`.
pub type Node = u32;
