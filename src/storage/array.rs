//! # Flat Array Files
//!
//! Typed read-only views over `CFA1` files: a 16-byte header followed by a
//! contiguous little-endian payload. Three element kinds cover the whole
//! format: `u8` (type ids), `u32` (node ids, ranks, string-pool indices)
//! and `i32` (integer feature values with a sentinel for absence).
//!
//! Scalar access is bounds-safe (`get` returns `None` past the end); the
//! bulk filters in [`crate::features`] work on the raw little-endian slices
//! returned by `slice()` so a filter pass is one linear sweep over
//! contiguous memory.

use eyre::{ensure, Result};
use zerocopy::little_endian::{I32 as I32Le, U32 as U32Le, U64 as U64Le};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{parse_zerocopy, Backing};
use crate::error::FabricError;

pub const ARRAY_MAGIC: [u8; 4] = *b"CFA1";
pub const ARRAY_HEADER_SIZE: usize = 16;

/// Sentinel meaning "absent" in integer feature arrays.
pub const MISSING_INT: i32 = i32::MIN;

/// Element kind codes stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElemKind {
    U8 = 1,
    U32 = 2,
    I32 = 3,
}

impl ElemKind {
    pub fn width(self) -> usize {
        match self {
            ElemKind::U8 => 1,
            ElemKind::U32 | ElemKind::I32 => 4,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ElemKind::U8),
            2 => Some(ElemKind::U32),
            3 => Some(ElemKind::I32),
            _ => None,
        }
    }
}

#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ArrayHeader {
    pub magic: [u8; 4],
    pub elem: u8,
    pub flags: u8,
    pub pad: [u8; 2],
    count: U64Le,
}

impl ArrayHeader {
    zerocopy_getters! {
        count: u64,
    }

    pub fn new(elem: ElemKind, count: u64) -> Self {
        ArrayHeader {
            magic: ARRAY_MAGIC,
            elem: elem as u8,
            flags: 0,
            pad: [0; 2],
            count: U64Le::new(count),
        }
    }
}

/// Validates the header of a flat-array file and returns `(kind, count)`.
fn open_header(backing: &Backing, expect: ElemKind) -> Result<usize> {
    let bytes = backing.bytes();
    let header: &ArrayHeader = parse_zerocopy(bytes, "ArrayHeader")?;

    if header.magic != ARRAY_MAGIC {
        return Err(FabricError::corrupt(format!(
            "'{}': bad array magic {:02x?}",
            backing.label(),
            header.magic
        ))
        .into());
    }
    let kind = ElemKind::from_code(header.elem).ok_or_else(|| {
        FabricError::corrupt(format!(
            "'{}': unknown element kind {}",
            backing.label(),
            header.elem
        ))
    })?;
    ensure!(
        kind == expect,
        FabricError::corrupt(format!(
            "'{}': element kind {:?}, expected {:?}",
            backing.label(),
            kind,
            expect
        ))
    );

    let count = header.count() as usize;
    let need = ARRAY_HEADER_SIZE + count * kind.width();
    if bytes.len() < need {
        return Err(FabricError::corrupt(format!(
            "'{}': file is {} bytes, header declares {}",
            backing.label(),
            bytes.len(),
            need
        ))
        .into());
    }
    Ok(count)
}

/// Flat `u8` array view. Bytes need no endianness wrapper, so this one is
/// hand-rolled rather than macro-generated.
#[derive(Debug, Clone)]
pub struct U8Array {
    backing: Backing,
    count: usize,
}

impl U8Array {
    pub fn open(backing: Backing) -> Result<Self> {
        let count = open_header(&backing, ElemKind::U8)?;
        Ok(Self { backing, count })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn slice(&self) -> &[u8] {
        &self.backing.bytes()[ARRAY_HEADER_SIZE..ARRAY_HEADER_SIZE + self.count]
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.slice().get(index).copied()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.slice().to_vec()
    }

    pub fn prefetch(&self) {
        self.backing.prefetch();
    }
}

macro_rules! flat_array {
    ($name:ident, $kind:expr, $le:ty, $native:ty) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            backing: Backing,
            count: usize,
        }

        impl $name {
            pub fn open(backing: Backing) -> Result<Self> {
                let count = open_header(&backing, $kind)?;
                Ok(Self { backing, count })
            }

            #[inline]
            pub fn len(&self) -> usize {
                self.count
            }

            pub fn is_empty(&self) -> bool {
                self.count == 0
            }

            /// The full payload as a little-endian slice. Basis of the
            /// vectorized bulk filters: one contiguous sweep, no per-element
            /// dispatch.
            #[inline]
            pub fn slice(&self) -> &[$le] {
                let bytes = &self.backing.bytes()
                    [ARRAY_HEADER_SIZE..ARRAY_HEADER_SIZE + self.count * std::mem::size_of::<$le>()];
                // Header validation guaranteed the length; the LE wrapper
                // types are alignment-1 so any byte offset is valid.
                <[$le]>::ref_from_bytes(bytes).expect("validated payload")
            }

            /// Bounds-safe scalar access.
            #[inline]
            pub fn get(&self, index: usize) -> Option<$native> {
                self.slice().get(index).map(|v| v.get())
            }

            pub fn to_vec(&self) -> Vec<$native> {
                self.slice().iter().map(|v| v.get()).collect()
            }

            pub fn prefetch(&self) {
                self.backing.prefetch();
            }
        }
    };
}

flat_array!(U32Array, ElemKind::U32, U32Le, u32);
flat_array!(I32Array, ElemKind::I32, I32Le, i32);

/// Serializes a `u32` flat-array file.
pub fn encode_u32_array(values: &[u32]) -> Vec<u8> {
    let header = ArrayHeader::new(ElemKind::U32, values.len() as u64);
    let mut out = Vec::with_capacity(ARRAY_HEADER_SIZE + values.len() * 4);
    out.extend_from_slice(header.as_bytes());
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Serializes an `i32` flat-array file.
pub fn encode_i32_array(values: &[i32]) -> Vec<u8> {
    let header = ArrayHeader::new(ElemKind::I32, values.len() as u64);
    let mut out = Vec::with_capacity(ARRAY_HEADER_SIZE + values.len() * 4);
    out.extend_from_slice(header.as_bytes());
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Serializes a `u8` flat-array file.
pub fn encode_u8_array(values: &[u8]) -> Vec<u8> {
    let header = ArrayHeader::new(ElemKind::U8, values.len() as u64);
    let mut out = Vec::with_capacity(ARRAY_HEADER_SIZE + values.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(values);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;

    #[test]
    fn u32_round_trip() {
        let values = vec![1u32, 7, 42, u32::MAX];
        let bytes = encode_u32_array(&values);
        let arr = U32Array::open(Backing::from_vec(bytes)).unwrap();
        assert_eq!(arr.len(), 4);
        assert_eq!(arr.to_vec(), values);
        assert_eq!(arr.get(2), Some(42));
        assert_eq!(arr.get(4), None);
    }

    #[test]
    fn i32_round_trip_with_sentinel() {
        let values = vec![MISSING_INT, -3, 0, 9];
        let bytes = encode_i32_array(&values);
        let arr = I32Array::open(Backing::from_vec(bytes)).unwrap();
        assert_eq!(arr.get(0), Some(MISSING_INT));
        assert_eq!(arr.get(1), Some(-3));
    }

    #[test]
    fn bad_magic_is_corrupt_store() {
        let mut bytes = encode_u32_array(&[1, 2, 3]);
        bytes[0] = b'X';
        let err = U32Array::open(Backing::from_vec(bytes)).unwrap_err();
        assert!(matches!(
            error_kind(&err),
            Some(crate::FabricError::CorruptStore { .. })
        ));
    }

    #[test]
    fn truncated_payload_is_corrupt_store() {
        let mut bytes = encode_u32_array(&[1, 2, 3]);
        bytes.truncate(bytes.len() - 2);
        let err = U32Array::open(Backing::from_vec(bytes)).unwrap_err();
        assert!(matches!(
            error_kind(&err),
            Some(crate::FabricError::CorruptStore { .. })
        ));
    }

    #[test]
    fn wrong_element_kind_is_rejected() {
        let bytes = encode_i32_array(&[1, 2]);
        assert!(U32Array::open(Backing::from_vec(bytes)).is_err());
    }
}
