//! # Memory-Mapped File Access
//!
//! Read-only mapping of one corpus file. Corpus files are immutable after
//! compilation, which makes the mapping model simple: maps never grow, are
//! never remapped, and can be shared freely across threads behind an `Arc`.
//!
//! ## Design
//!
//! Traditional loaders copy file contents into process buffers. Mapping the
//! file instead lets the OS page cache serve all readers, including sibling
//! worker processes opened on the same corpus. The typed views in
//! [`super::array`] and [`super::csr`] borrow directly from the mapped
//! region; their lifetimes are tied to the `Arc<MmapFile>` they hold, so a
//! view can never outlive its map.
//!
//! ## Platform Behavior
//!
//! On Unix, `prefetch` issues `madvise(MADV_WILLNEED)` ahead of sequential
//! scans (type-range walks, checksum verification). On other platforms it
//! is a no-op; the scan itself still works, it just pays the page faults.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Result, WrapErr};
use memmap2::Mmap;

use crate::error::FabricError;

#[derive(Debug)]
pub struct MmapFile {
    path: PathBuf,
    mmap: Mmap,
}

impl MmapFile {
    /// Maps a corpus file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref();

        let file = File::open(path)
            .map_err(|e| FabricError::io(path, e))
            .wrap_err_with(|| format!("failed to open corpus file '{}'", path.display()))?;

        // SAFETY: Mmap::map is unsafe because the underlying file could be
        // modified externally while mapped. This is safe because:
        // 1. Corpus files are append-only per version: once meta.json is
        //    written, no writer ever touches the directory again
        // 2. The map is read-only (PROT_READ); this process cannot write
        // 3. The mmap lifetime is tied to MmapFile behind an Arc, so typed
        //    views keep the mapping alive for as long as they exist
        let mmap = unsafe {
            Mmap::map(&file)
                .map_err(|e| FabricError::io(path, e))
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            mmap,
        }))
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hints the kernel that a byte range will be read soon.
    pub fn prefetch(&self, offset: usize, len: usize) {
        if offset >= self.mmap.len() {
            return;
        }
        let len = len.min(self.mmap.len() - offset);
        if len == 0 {
            return;
        }

        #[cfg(unix)]
        // SAFETY: madvise with MADV_WILLNEED is advisory and cannot cause
        // undefined behavior for a valid range. The range is valid because:
        // 1. offset was bounds-checked above (early return past the map)
        // 2. len is clamped to the remaining map length
        // 3. the mapping stays alive for the duration of the call (&self)
        unsafe {
            libc::madvise(
                self.mmap.as_ptr().add(offset) as *mut libc::c_void,
                len,
                libc::MADV_WILLNEED,
            );
        }
        #[cfg(not(unix))]
        let _ = (offset, len);
    }
}
