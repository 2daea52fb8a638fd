//! # The Backing Store
//!
//! [`Store`] assembles one version directory of a compiled corpus: the
//! `meta.json` descriptor plus read-only maps of every warp file. Opening a
//! store maps the warp files and validates their headers against the
//! declared dimensions; no array content is read until accessed.
//!
//! Feature and edge files are *not* opened here. The store resolves their
//! paths and hands out backings on demand; the lazily-populated handle
//! caches live one level up, in [`crate::Fabric`].
//!
//! ## Version Discovery
//!
//! A corpus directory holds one subdirectory per compiled version, named
//! `v{N}`. `open` with an explicit version requires that directory; with
//! none it picks the highest version present. A directory with no `v{N}`
//! children (or one whose `meta.json` is missing) is not a corpus store.

use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use tracing::{debug, info};
use zerocopy::little_endian::U32 as U32Le;

use super::{Backing, Csr, Meta, MmapFile, U32Array, U8Array};
use crate::error::FabricError;
use crate::Node;

/// Per-type node range, parallel to the type table in `meta.json`.
#[derive(Debug, Clone, Copy)]
pub struct LevelEntry {
    pub min_node: Node,
    pub max_node: Node,
    pub count: u32,
}

/// The slot set of a node: a borrowed CSR row for non-slot nodes, the node
/// itself for slots.
#[derive(Debug, Clone, Copy)]
pub enum Slots<'a> {
    Single(Node),
    Row(&'a [U32Le]),
}

impl<'a> Slots<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Slots::Single(_) => 1,
            Slots::Row(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn first(&self) -> Option<Node> {
        match self {
            Slots::Single(s) => Some(*s),
            Slots::Row(r) => r.first().map(|v| v.get()),
        }
    }

    #[inline]
    pub fn last(&self) -> Option<Node> {
        match self {
            Slots::Single(s) => Some(*s),
            Slots::Row(r) => r.last().map(|v| v.get()),
        }
    }

    /// Membership test; rows are ascending so this is a binary search.
    pub fn contains(&self, slot: Node) -> bool {
        match self {
            Slots::Single(s) => *s == slot,
            Slots::Row(r) => r.binary_search_by(|v| v.get().cmp(&slot)).is_ok(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Node> + 'a {
        let (single, row) = match self {
            Slots::Single(s) => (Some(*s), &[][..]),
            Slots::Row(r) => (None, *r),
        };
        single
            .into_iter()
            .chain(row.iter().map(|v| v.get()))
    }

    /// True if the slot set is a contiguous interval, in which case
    /// containment tests reduce to interval arithmetic.
    pub fn is_contiguous(&self) -> bool {
        match (self.first(), self.last()) {
            (Some(f), Some(l)) => (l - f + 1) as usize == self.len(),
            _ => true,
        }
    }

    /// True if every slot of `self` is also a slot of `other`.
    pub fn subset_of(&self, other: &Slots<'_>) -> bool {
        match (self.first(), self.last(), other.first(), other.last()) {
            (Some(f), Some(l), Some(of), Some(ol)) => {
                if f < of || l > ol {
                    return false;
                }
                if other.is_contiguous() {
                    return true;
                }
                self.iter().all(|s| other.contains(s))
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    version: u32,
    meta: Meta,
    otype: U8Array,
    oslots: Csr,
    order: U32Array,
    rank: U32Array,
    levels: Vec<LevelEntry>,
    lev_up: Csr,
    lev_down: Csr,
    boundary: U32Array,
}

impl Store {
    /// Opens a compiled corpus. With `version: None`, the highest compiled
    /// version wins. `preload_embeddings` copies the two embedding CSRs
    /// into owned memory.
    pub fn open(corpus_dir: &Path, version: Option<u32>, preload_embeddings: bool) -> Result<Store> {
        let (dir, version) = resolve_version(corpus_dir, version)?;
        info!(corpus = %corpus_dir.display(), version, "opening corpus store");

        let meta = Meta::load(&dir.join("meta.json"))?;
        let n = meta.node_count as usize;
        let s = meta.slot_count as usize;

        let warp = dir.join("warp");
        let otype = U8Array::open(map(&warp.join("otype.bin"))?)
            .wrap_err("while opening warp/otype.bin")?;
        let oslots =
            Csr::open(map(&warp.join("oslots.csr"))?).wrap_err("while opening warp/oslots.csr")?;
        let order = U32Array::open(map(&warp.join("order.bin"))?)
            .wrap_err("while opening warp/order.bin")?;
        let rank =
            U32Array::open(map(&warp.join("rank.bin"))?).wrap_err("while opening warp/rank.bin")?;
        let levels_arr = U32Array::open(map(&warp.join("levels.bin"))?)
            .wrap_err("while opening warp/levels.bin")?;
        let mut lev_up =
            Csr::open(map(&warp.join("levUp.csr"))?).wrap_err("while opening warp/levUp.csr")?;
        let mut lev_down = Csr::open(map(&warp.join("levDown.csr"))?)
            .wrap_err("while opening warp/levDown.csr")?;
        let boundary = U32Array::open(map(&warp.join("boundary.bin"))?)
            .wrap_err("while opening warp/boundary.bin")?;

        ensure!(
            otype.len() == n,
            FabricError::corrupt(format!("otype has {} entries, node_count is {n}", otype.len()))
        );
        ensure!(
            oslots.rows() == n - s,
            FabricError::corrupt(format!(
                "oslots has {} rows, expected {} non-slot nodes",
                oslots.rows(),
                n - s
            ))
        );
        ensure!(
            order.len() == n && rank.len() == n,
            FabricError::corrupt("order/rank length differs from node_count")
        );
        ensure!(
            lev_up.rows() == n && lev_down.rows() == n,
            FabricError::corrupt("levUp/levDown row count differs from node_count")
        );
        ensure!(
            boundary.len() == 2 * n,
            FabricError::corrupt(format!(
                "boundary has {} entries, expected {}",
                boundary.len(),
                2 * n
            ))
        );
        ensure!(
            levels_arr.len() == 3 * meta.types.len(),
            FabricError::corrupt(format!(
                "levels has {} entries, expected {} (3 per type)",
                levels_arr.len(),
                3 * meta.types.len()
            ))
        );

        let levels = levels_arr
            .slice()
            .chunks_exact(3)
            .map(|c| LevelEntry {
                min_node: c[0].get(),
                max_node: c[1].get(),
                count: c[2].get(),
            })
            .collect();

        if preload_embeddings {
            debug!("preloading embedding CSRs into owned memory");
            lev_up = lev_up.preload();
            lev_down = lev_down.preload();
        }

        // Every query touches otype and rank; page them in ahead of the
        // first scan.
        otype.prefetch();
        order.prefetch();
        rank.prefetch();

        Ok(Store {
            dir,
            version,
            meta,
            otype,
            oslots,
            order,
            rank,
            levels,
            lev_up,
            lev_down,
            boundary,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    #[inline]
    pub fn node_count(&self) -> Node {
        self.meta.node_count
    }

    #[inline]
    pub fn slot_count(&self) -> Node {
        self.meta.slot_count
    }

    #[inline]
    pub fn in_bounds(&self, n: Node) -> bool {
        n >= 1 && n <= self.meta.node_count
    }

    #[inline]
    pub fn is_slot(&self, n: Node) -> bool {
        n >= 1 && n <= self.meta.slot_count
    }

    /// Type id of a node (level-order index into the type table).
    #[inline]
    pub fn otype_id(&self, n: Node) -> Option<u8> {
        if !self.in_bounds(n) {
            return None;
        }
        self.otype.get((n - 1) as usize)
    }

    pub fn type_of(&self, n: Node) -> Option<&str> {
        self.otype_id(n).and_then(|id| self.meta.type_name(id))
    }

    /// Raw type-id array, for vectorized type tests.
    #[inline]
    pub fn otype_slice(&self) -> &[u8] {
        self.otype.slice()
    }

    /// The slot set of a node.
    pub fn slots(&self, n: Node) -> Result<Slots<'_>> {
        if self.is_slot(n) {
            return Ok(Slots::Single(n));
        }
        ensure!(
            self.in_bounds(n),
            FabricError::out_of_range(format!("node {n} of {}", self.meta.node_count))
        );
        let row = self.oslots.row((n - 1 - self.meta.slot_count) as usize)?;
        Ok(Slots::Row(row))
    }

    /// Number of slots covered by a node.
    pub fn span(&self, n: Node) -> Option<u32> {
        if self.is_slot(n) {
            return Some(1);
        }
        if !self.in_bounds(n) {
            return None;
        }
        self.oslots
            .row_len((n - 1 - self.meta.slot_count) as usize)
            .ok()
            .map(|l| l as u32)
    }

    #[inline]
    pub fn first_slot(&self, n: Node) -> Option<Node> {
        if !self.in_bounds(n) {
            return None;
        }
        self.boundary.get((n - 1) as usize)
    }

    #[inline]
    pub fn last_slot(&self, n: Node) -> Option<Node> {
        if !self.in_bounds(n) {
            return None;
        }
        self.boundary
            .get((self.meta.node_count + n - 1) as usize)
    }

    /// 1-based canonical rank of a node.
    #[inline]
    pub fn rank_of(&self, n: Node) -> Option<u32> {
        if !self.in_bounds(n) {
            return None;
        }
        self.rank.get((n - 1) as usize)
    }

    /// Node at a 0-based position of the canonical order.
    #[inline]
    pub fn node_at(&self, pos: usize) -> Option<Node> {
        self.order.get(pos)
    }

    pub fn order_slice(&self) -> &[U32Le] {
        self.order.slice()
    }

    /// Embedders of a node, widest first then rank-ascending.
    pub fn lev_up(&self, n: Node) -> Result<&[U32Le]> {
        ensure!(
            self.in_bounds(n),
            FabricError::out_of_range(format!("node {n} of {}", self.meta.node_count))
        );
        self.lev_up.row((n - 1) as usize)
    }

    /// Embeddees of a node, rank-ascending.
    pub fn lev_down(&self, n: Node) -> Result<&[U32Le]> {
        ensure!(
            self.in_bounds(n),
            FabricError::out_of_range(format!("node {n} of {}", self.meta.node_count))
        );
        self.lev_down.row((n - 1) as usize)
    }

    /// The next node of the same type in canonical order.
    pub fn next_same_type(&self, n: Node) -> Option<Node> {
        let tid = self.otype_id(n)?;
        let pos = self.rank_of(n)? as usize;
        self.order.slice()[pos..]
            .iter()
            .map(|v| v.get())
            .find(|&m| self.otype_id(m) == Some(tid))
    }

    /// The previous node of the same type in canonical order.
    pub fn prev_same_type(&self, n: Node) -> Option<Node> {
        let tid = self.otype_id(n)?;
        let pos = self.rank_of(n)? as usize - 1;
        self.order.slice()[..pos]
            .iter()
            .rev()
            .map(|v| v.get())
            .find(|&m| self.otype_id(m) == Some(tid))
    }

    /// Per-type node ranges, parallel to `meta().types`.
    pub fn levels(&self) -> &[LevelEntry] {
        &self.levels
    }

    pub fn level_of(&self, type_id: u8) -> Option<&LevelEntry> {
        self.levels.get(type_id as usize)
    }

    /// Resolves a catalogued feature file to an absolute path, verifying it
    /// exists.
    pub fn feature_file(&self, name: &str) -> Result<PathBuf> {
        let entry = self.meta.feature(name)?;
        let path = self.dir.join(&entry.path);
        if !path.is_file() {
            return Err(FabricError::MissingFeature {
                name: name.to_string(),
                path,
            }
            .into());
        }
        Ok(path)
    }

    /// Maps a file under the version directory.
    pub fn map_rel(&self, rel: &str) -> Result<Backing> {
        map(&self.dir.join(rel))
    }

    /// Full checksum sweep against `meta.json`. Reads every catalogued file
    /// once; intended for doctors and tests, not the open path.
    pub fn verify(&self) -> Result<()> {
        const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
        for (rel, expected) in &self.meta.checksums {
            let path = self.dir.join(rel);
            let bytes = std::fs::read(&path)
                .map_err(|e| FabricError::io(&path, e))
                .wrap_err_with(|| format!("while verifying '{rel}'"))?;
            let actual = CRC32.checksum(&bytes);
            ensure!(
                actual == *expected,
                FabricError::corrupt(format!(
                    "'{rel}': checksum {actual:#010x}, recorded {expected:#010x}"
                ))
            );
        }
        debug!(files = self.meta.checksums.len(), "store verified");
        Ok(())
    }
}

fn map(path: &Path) -> Result<Backing> {
    Ok(Backing::Mapped(MmapFile::open(path)?))
}

fn resolve_version(corpus_dir: &Path, version: Option<u32>) -> Result<(PathBuf, u32)> {
    if let Some(v) = version {
        let dir = corpus_dir.join(format!("v{v}"));
        ensure!(
            dir.is_dir(),
            FabricError::corrupt(format!(
                "'{}' has no compiled version v{v}",
                corpus_dir.display()
            ))
        );
        return Ok((dir, v));
    }

    let mut best: Option<u32> = None;
    let entries = std::fs::read_dir(corpus_dir)
        .map_err(|e| FabricError::io(corpus_dir, e))
        .wrap_err_with(|| format!("failed to scan corpus dir '{}'", corpus_dir.display()))?;
    for entry in entries {
        let entry = entry.map_err(|e| FabricError::io(corpus_dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(num) = name.strip_prefix('v').and_then(|s| s.parse::<u32>().ok()) {
            if entry.path().join("meta.json").is_file() {
                best = Some(best.map_or(num, |b| b.max(num)));
            }
        }
    }
    let v = best.ok_or_else(|| {
        FabricError::corrupt(format!(
            "'{}' contains no compiled corpus version",
            corpus_dir.display()
        ))
    })?;
    Ok((corpus_dir.join(format!("v{v}")), v))
}
