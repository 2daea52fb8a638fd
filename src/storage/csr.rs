//! # CSR Array Files
//!
//! Compressed-sparse-row views over `CFC1` files, used wherever each node
//! maps to a variable number of values: `oslots`, the two embedding
//! relations, and edge features. A CSR file holds an offsets section
//! (`rows + 1` monotone entries) and a contiguous targets section; valued
//! edges carry a third parallel section of 4-byte value words.
//!
//! Row access is bounds-checked against the header-declared lengths;
//! malformed offsets surface as `ArrayOutOfRange` rather than reading out
//! of the section. Rows are zero-copy slices into the backing.

use eyre::Result;
use zerocopy::little_endian::{I32 as I32Le, U32 as U32Le, U64 as U64Le};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{parse_zerocopy, Backing};
use crate::error::FabricError;

pub const CSR_MAGIC: [u8; 4] = *b"CFC1";
pub const CSR_HEADER_SIZE: usize = 24;

/// Sentinel meaning "edge present, no value" in int-valued edge features.
/// Kept distinct from any real value so a valueless edge is not read as 0.
pub const NONE_INT_VALUE: i32 = i32::MIN;

/// Kind of the optional parallel value section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueKind {
    None = 0,
    Int = 2,
    StrIndex = 3,
}

impl ValueKind {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ValueKind::None),
            2 => Some(ValueKind::Int),
            3 => Some(ValueKind::StrIndex),
            _ => None,
        }
    }
}

#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CsrHeader {
    pub magic: [u8; 4],
    pub value_kind: u8,
    pub flags: u8,
    pub pad: [u8; 2],
    rows: U64Le,
    len: U64Le,
}

impl CsrHeader {
    zerocopy_getters! {
        rows: u64,
        len: u64,
    }

    pub fn new(value_kind: ValueKind, rows: u64, len: u64) -> Self {
        CsrHeader {
            magic: CSR_MAGIC,
            value_kind: value_kind as u8,
            flags: 0,
            pad: [0; 2],
            rows: U64Le::new(rows),
            len: U64Le::new(len),
        }
    }
}

/// One row of the value section.
#[derive(Debug, Clone, Copy)]
pub enum ValuesRow<'a> {
    Int(&'a [I32Le]),
    StrIndex(&'a [U32Le]),
}

#[derive(Debug, Clone)]
pub struct Csr {
    backing: Backing,
    rows: usize,
    len: usize,
    value_kind: ValueKind,
}

impl Csr {
    pub fn open(backing: Backing) -> Result<Self> {
        let bytes = backing.bytes();
        let header: &CsrHeader = parse_zerocopy(bytes, "CsrHeader")?;

        if header.magic != CSR_MAGIC {
            return Err(FabricError::corrupt(format!(
                "'{}': bad CSR magic {:02x?}",
                backing.label(),
                header.magic
            ))
            .into());
        }
        let value_kind = ValueKind::from_code(header.value_kind).ok_or_else(|| {
            FabricError::corrupt(format!(
                "'{}': unknown CSR value kind {}",
                backing.label(),
                header.value_kind
            ))
        })?;

        let rows = header.rows() as usize;
        let len = header.len() as usize;
        let sections = if value_kind == ValueKind::None { 1 } else { 2 };
        let need = CSR_HEADER_SIZE + (rows + 1) * 4 + sections * len * 4;
        if bytes.len() < need {
            return Err(FabricError::corrupt(format!(
                "'{}': file is {} bytes, header declares {}",
                backing.label(),
                bytes.len(),
                need
            ))
            .into());
        }

        Ok(Csr {
            backing,
            rows,
            len,
            value_kind,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Total number of stored values across all rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    #[inline]
    fn offsets(&self) -> &[U32Le] {
        let bytes =
            &self.backing.bytes()[CSR_HEADER_SIZE..CSR_HEADER_SIZE + (self.rows + 1) * 4];
        <[U32Le]>::ref_from_bytes(bytes).expect("validated offsets section")
    }

    #[inline]
    fn targets(&self) -> &[U32Le] {
        let start = CSR_HEADER_SIZE + (self.rows + 1) * 4;
        let bytes = &self.backing.bytes()[start..start + self.len * 4];
        <[U32Le]>::ref_from_bytes(bytes).expect("validated targets section")
    }

    /// Resolves the checked `(start, end)` bounds of one row.
    fn row_bounds(&self, row: usize) -> Result<(usize, usize)> {
        if row >= self.rows {
            return Err(FabricError::out_of_range(format!(
                "'{}': row {} of {}",
                self.backing.label(),
                row,
                self.rows
            ))
            .into());
        }
        let offsets = self.offsets();
        let start = offsets[row].get() as usize;
        let end = offsets[row + 1].get() as usize;
        if start > end || end > self.len {
            return Err(FabricError::out_of_range(format!(
                "'{}': row {} offsets {}..{} exceed value count {}",
                self.backing.label(),
                row,
                start,
                end,
                self.len
            ))
            .into());
        }
        Ok((start, end))
    }

    /// Targets of one row, zero-copy.
    pub fn row(&self, row: usize) -> Result<&[U32Le]> {
        let (start, end) = self.row_bounds(row)?;
        Ok(&self.targets()[start..end])
    }

    #[inline]
    pub fn row_len(&self, row: usize) -> Result<usize> {
        let (start, end) = self.row_bounds(row)?;
        Ok(end - start)
    }

    /// Value words of one row, if this CSR carries values.
    pub fn values_row(&self, row: usize) -> Result<Option<ValuesRow<'_>>> {
        if self.value_kind == ValueKind::None {
            return Ok(None);
        }
        let (start, end) = self.row_bounds(row)?;
        let section = CSR_HEADER_SIZE + (self.rows + 1) * 4 + self.len * 4;
        let bytes = &self.backing.bytes()[section + start * 4..section + end * 4];
        Ok(Some(match self.value_kind {
            ValueKind::Int => ValuesRow::Int(<[I32Le]>::ref_from_bytes(bytes).expect("validated")),
            ValueKind::StrIndex => {
                ValuesRow::StrIndex(<[U32Le]>::ref_from_bytes(bytes).expect("validated"))
            }
            ValueKind::None => unreachable!(),
        }))
    }

    /// Copies the whole file into owned memory, detaching it from the map.
    /// Used by the embedding preload to trade RAM for page-fault-free
    /// traversal.
    pub fn preload(&self) -> Csr {
        let bytes: Vec<u8> = self.backing.bytes().to_vec();
        Csr {
            backing: Backing::from_vec(bytes),
            rows: self.rows,
            len: self.len,
            value_kind: self.value_kind,
        }
    }

    /// Inverts source -> target into target -> source, carrying values
    /// along. The result is an owned CSR with the same row count; used to
    /// serve `edges_to` without a second file on disk.
    pub fn invert(&self) -> Result<Csr> {
        let offsets = self.offsets();
        let targets = self.targets();

        // In-degree count, then prefix sums, then a fill pass.
        let mut degree = vec![0u32; self.rows];
        for t in targets {
            let t = t.get() as usize;
            // Targets outside the row space are skipped, not an error:
            // subset corpora may carry edges to absent nodes.
            if t >= 1 && t <= self.rows {
                degree[t - 1] += 1;
            }
        }

        let mut inv_offsets = vec![0u32; self.rows + 1];
        for i in 0..self.rows {
            inv_offsets[i + 1] = inv_offsets[i] + degree[i];
        }
        let total = inv_offsets[self.rows] as usize;

        let mut inv_targets = vec![0u32; total];
        let mut inv_values = if self.value_kind == ValueKind::None {
            None
        } else {
            Some(vec![0u32; total])
        };
        let value_section = CSR_HEADER_SIZE + (self.rows + 1) * 4 + self.len * 4;
        let value_words: Option<&[U32Le]> = if self.value_kind == ValueKind::None {
            None
        } else {
            let bytes = &self.backing.bytes()[value_section..value_section + self.len * 4];
            Some(<[U32Le]>::ref_from_bytes(bytes).expect("validated"))
        };

        let mut cursor: Vec<u32> = inv_offsets[..self.rows].to_vec();
        for source in 0..self.rows {
            let start = offsets[source].get() as usize;
            let end = offsets[source + 1].get() as usize;
            for pos in start..end.min(self.len) {
                let t = targets[pos].get() as usize;
                if t < 1 || t > self.rows {
                    continue;
                }
                let slot = cursor[t - 1] as usize;
                inv_targets[slot] = source as u32 + 1;
                if let (Some(vals), Some(words)) = (inv_values.as_mut(), value_words) {
                    vals[slot] = words[pos].get();
                }
                cursor[t - 1] += 1;
            }
        }

        // Keep each inverse row sorted by source node id.
        for row in 0..self.rows {
            let (s, e) = (inv_offsets[row] as usize, inv_offsets[row + 1] as usize);
            if e - s > 1 {
                match inv_values.as_mut() {
                    None => inv_targets[s..e].sort_unstable(),
                    Some(vals) => {
                        let mut paired: Vec<(u32, u32)> = inv_targets[s..e]
                            .iter()
                            .copied()
                            .zip(vals[s..e].iter().copied())
                            .collect();
                        paired.sort_unstable_by_key(|p| p.0);
                        for (i, (t, v)) in paired.into_iter().enumerate() {
                            inv_targets[s + i] = t;
                            vals[s + i] = v;
                        }
                    }
                }
            }
        }

        let bytes = encode_csr_raw(
            self.value_kind,
            &inv_offsets,
            &inv_targets,
            inv_values.as_deref(),
        );
        Csr::open(Backing::from_vec(bytes))
    }
}

fn encode_csr_raw(
    value_kind: ValueKind,
    offsets: &[u32],
    targets: &[u32],
    value_words: Option<&[u32]>,
) -> Vec<u8> {
    let rows = offsets.len() - 1;
    let header = CsrHeader::new(value_kind, rows as u64, targets.len() as u64);
    let sections = if value_kind == ValueKind::None { 1 } else { 2 };
    let mut out =
        Vec::with_capacity(CSR_HEADER_SIZE + offsets.len() * 4 + sections * targets.len() * 4);
    out.extend_from_slice(header.as_bytes());
    for o in offsets {
        out.extend_from_slice(&o.to_le_bytes());
    }
    for t in targets {
        out.extend_from_slice(&t.to_le_bytes());
    }
    if let Some(words) = value_words {
        debug_assert_eq!(words.len(), targets.len());
        for w in words {
            out.extend_from_slice(&w.to_le_bytes());
        }
    }
    out
}

/// Serializes a plain CSR file from per-row target lists.
pub fn encode_csr(rows: &[Vec<u32>]) -> Vec<u8> {
    let mut offsets = Vec::with_capacity(rows.len() + 1);
    let mut targets = Vec::new();
    offsets.push(0u32);
    for row in rows {
        targets.extend_from_slice(row);
        offsets.push(targets.len() as u32);
    }
    encode_csr_raw(ValueKind::None, &offsets, &targets, None)
}

/// Serializes a valued CSR file. `value_words` are raw 4-byte words
/// (i32 bit patterns for `ValueKind::Int`, pool indices for
/// `ValueKind::StrIndex`) parallel to the targets of each row.
pub fn encode_csr_with_values(
    rows: &[Vec<u32>],
    value_words: &[Vec<u32>],
    kind: ValueKind,
) -> Vec<u8> {
    debug_assert_eq!(rows.len(), value_words.len());
    let mut offsets = Vec::with_capacity(rows.len() + 1);
    let mut targets = Vec::new();
    let mut words = Vec::new();
    offsets.push(0u32);
    for (row, vals) in rows.iter().zip(value_words) {
        debug_assert_eq!(row.len(), vals.len());
        targets.extend_from_slice(row);
        words.extend_from_slice(vals);
        offsets.push(targets.len() as u32);
    }
    encode_csr_raw(kind, &offsets, &targets, Some(&words))
}
