//! # Storage Module
//!
//! The foundational storage layer: memory-mapped access to the compiled
//! corpus format (CFM) with zero-copy semantics.
//!
//! ## Architecture Overview
//!
//! A compiled corpus is a directory of raw little-endian arrays plus one
//! JSON descriptor. Every binary file carries a small fixed header (magic,
//! element kind, count) and is mapped read-only into the process address
//! space. Opening a store deserializes nothing but `meta.json`; array pages
//! are faulted in lazily by the OS as they are touched.
//!
//! - **Zero-copy reads**: typed views return slices pointing directly into
//!   the mapped region
//! - **Shared pages**: forked or spawned workers share the mapped pages via
//!   the OS; no per-process copies
//! - **Lazy paging**: a query that touches one book of a corpus pages in
//!   one book
//!
//! ## File Formats
//!
//! Flat arrays (`CFA1`):
//!
//! ```text
//! +--------+------+-------+------+----------------------+
//! | magic  | elem | flags | pad  | count (u64 LE)       |  16-byte header
//! +--------+------+-------+------+----------------------+
//! | payload: count * elem_width bytes, little-endian    |
//! +-----------------------------------------------------+
//! ```
//!
//! CSR arrays (`CFC1`):
//!
//! ```text
//! +--------+-------+-------+-----+-----------+-----------+
//! | magic  | vkind | flags | pad | rows u64  | len u64   |  24-byte header
//! +--------+-------+-------+-----+-----------+-----------+
//! | offsets: (rows + 1) * u32, monotone non-decreasing   |
//! | targets: len * u32                                   |
//! | values:  len * u32 words (only if vkind != none)     |
//! +------------------------------------------------------+
//! ```
//!
//! ## Safety Model
//!
//! The store is append-only per version: once `meta.json` is written the
//! directory is never mutated, so read-only maps cannot observe concurrent
//! writes. All access goes through typed views that bounds-check against
//! the header-declared counts; a malformed offset surfaces as
//! `ArrayOutOfRange`, never as an out-of-bounds read.
//!
//! ## Module Organization
//!
//! - `mmap`: read-only file mapping (`MmapFile`)
//! - `array`: flat-array views (`U8Array`, `U32Array`, `I32Array`)
//! - `csr`: compressed-sparse-row views with optional value sections
//! - `string_pool`: interned string tables for string-valued features
//! - `meta`: the `meta.json` descriptor model
//! - `store`: the assembled [`Store`] with all warp accessors

mod array;
mod csr;
mod meta;
mod mmap;
mod store;
mod string_pool;

pub use array::{
    encode_i32_array, encode_u32_array, encode_u8_array, ArrayHeader, ElemKind, I32Array, U8Array,
    U32Array, ARRAY_HEADER_SIZE, ARRAY_MAGIC, MISSING_INT,
};
pub use csr::{
    encode_csr, encode_csr_with_values, Csr, CsrHeader, ValueKind, ValuesRow, CSR_HEADER_SIZE,
    CSR_MAGIC, NONE_INT_VALUE,
};
pub use meta::{
    FeatureEntry, FeatureKind, Meta, SectionConfig, TypeEntry, ValueType, FORMAT_TAG,
    FORMAT_VERSION,
};
pub use mmap::MmapFile;
pub use store::{LevelEntry, Slots, Store};
pub use string_pool::{StringPool, MISSING_STR_INDEX};

use std::sync::Arc;

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Backing bytes for a typed view: either a shared read-only map or an
/// owned buffer (used by the embedding preload and by inverted CSRs).
#[derive(Debug, Clone)]
pub enum Backing {
    Mapped(Arc<MmapFile>),
    Owned(Arc<[u8]>),
}

impl Backing {
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(m) => m.bytes(),
            Backing::Owned(b) => b,
        }
    }

    /// Human-readable origin for error messages.
    pub fn label(&self) -> String {
        match self {
            Backing::Mapped(m) => m.path().display().to_string(),
            Backing::Owned(_) => "<owned buffer>".to_string(),
        }
    }

    /// Hints the kernel to page in the whole backing ahead of a scan.
    /// No-op for owned buffers, which are already resident.
    pub fn prefetch(&self) {
        if let Backing::Mapped(m) = self {
            m.prefetch(0, m.len());
        }
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Backing::Owned(Arc::from(bytes.into_boxed_slice()))
    }
}

/// Parses a zerocopy struct from the head of a byte slice with size
/// validation.
#[inline]
pub fn parse_zerocopy<'a, T: FromBytes + KnownLayout + Immutable>(
    bytes: &'a [u8],
    type_name: &str,
) -> Result<&'a T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::ref_from_bytes(&bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}
