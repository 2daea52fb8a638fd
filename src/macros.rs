//! # Internal Macros
//!
//! Boilerplate reducers for the binary file headers.
//!
//! ## zerocopy_getters!
//!
//! Generates read-only getter methods for zerocopy struct fields that use
//! little-endian wrapper types (U32, U64). The corpus format is read-only
//! after compilation, so no setters are generated.
//!
//! ```ignore
//! use zerocopy::little_endian::{U32, U64};
//!
//! #[repr(C)]
//! struct Header {
//!     row_count: U64,
//!     elem_width: U32,
//! }
//!
//! impl Header {
//!     zerocopy_getters! {
//!         row_count: u64,
//!         elem_width: u32,
//!     }
//! }
//! ```

/// Generates getter methods for zerocopy little-endian fields (read-only).
#[macro_export]
macro_rules! zerocopy_getters {
    ($($field:ident : $native_ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $field(&self) -> $native_ty {
                self.$field.get()
            }
        )*
    };
}
