//! Sparse byte-addressed memory backing the reference model.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::CosimError;

/// Page granularity of the sparse backing store.
pub const PAGE_BYTES: usize = 4096;

/// Read-only byte view of reference memory.
pub trait MemoryView {
    /// Reads one byte; unbacked addresses read as zero.
    fn read_byte(&self, addr: u64) -> u8;

    /// Reads `len` (at most 8) bytes little-endian starting at `addr`.
    fn read_le(&self, addr: u64, len: u32) -> u64 {
        (0..len.min(8)).fold(0, |acc, offset| {
            acc | u64::from(self.read_byte(addr.wrapping_add(u64::from(offset)))) << (offset * 8)
        })
    }
}

/// Binary image and the address it is loaded at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSegment {
    /// Load address.
    pub base: u64,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

impl ImageSegment {
    /// Reads an image file to be loaded at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`CosimError::Image`] when the file cannot be read.
    pub fn from_file(path: &Path, base: u64) -> Result<Self, CosimError> {
        let bytes = std::fs::read(path).map_err(|source| CosimError::Image {
            path: PathBuf::from(path),
            source,
        })?;
        Ok(Self { base, bytes })
    }

    /// Builds an image from little-endian 32-bit words.
    #[must_use]
    pub fn from_words(base: u64, words: &[u32]) -> Self {
        Self {
            base,
            bytes: words.iter().flat_map(|word| word.to_le_bytes()).collect(),
        }
    }
}

/// Sparse paged memory image.
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    pages: HashMap<u64, Box<[u8; PAGE_BYTES]>>,
}

impl MemoryImage {
    /// Creates an empty image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn page_base(addr: u64) -> u64 {
        addr & !(PAGE_BYTES as u64 - 1)
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn page_offset(addr: u64) -> usize {
        (addr & (PAGE_BYTES as u64 - 1)) as usize
    }

    /// Writes one byte, allocating its page on demand.
    pub fn write_byte(&mut self, addr: u64, value: u8) {
        let page = self
            .pages
            .entry(Self::page_base(addr))
            .or_insert_with(|| Box::new([0; PAGE_BYTES]));
        page[Self::page_offset(addr)] = value;
    }

    /// Writes the low `len` bytes of `value` little-endian at `addr`.
    pub fn write_le(&mut self, addr: u64, len: u32, value: u64) {
        for offset in 0..len.min(8) {
            #[allow(clippy::cast_possible_truncation)]
            let byte = (value >> (offset * 8)) as u8;
            self.write_byte(addr.wrapping_add(u64::from(offset)), byte);
        }
    }

    /// Copies a whole segment into memory.
    pub fn load(&mut self, segment: &ImageSegment) {
        for (offset, byte) in (0_u64..).zip(&segment.bytes) {
            self.write_byte(segment.base.wrapping_add(offset), *byte);
        }
    }

    /// Number of allocated pages.
    #[must_use]
    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }
}

impl MemoryView for MemoryImage {
    fn read_byte(&self, addr: u64) -> u8 {
        self.pages
            .get(&Self::page_base(addr))
            .map_or(0, |page| page[Self::page_offset(addr)])
    }
}

#[cfg(test)]
mod tests {
    use super::{ImageSegment, MemoryImage, MemoryView, PAGE_BYTES};

    #[test]
    fn unbacked_memory_reads_as_zero() {
        let memory = MemoryImage::new();
        assert_eq!(memory.read_byte(0x8000_0000), 0);
        assert_eq!(memory.read_le(0x8000_0000, 8), 0);
        assert_eq!(memory.resident_pages(), 0);
    }

    #[test]
    fn little_endian_access_spans_page_boundary() {
        let mut memory = MemoryImage::new();
        let addr = PAGE_BYTES as u64 - 2;
        memory.write_le(addr, 4, 0xDEAD_BEEF);

        assert_eq!(memory.read_le(addr, 4), 0xDEAD_BEEF);
        assert_eq!(memory.read_byte(addr), 0xEF);
        assert_eq!(memory.read_byte(addr + 3), 0xDE);
        assert_eq!(memory.resident_pages(), 2);
    }

    #[test]
    fn word_segment_loads_in_little_endian_order() {
        let mut memory = MemoryImage::new();
        memory.load(&ImageSegment::from_words(0x1000, &[0x02A0_0293, 0x0000_0013]));

        assert_eq!(memory.read_le(0x1000, 4), 0x02A0_0293);
        assert_eq!(memory.read_le(0x1004, 4), 0x0000_0013);
        assert_eq!(memory.read_le(0x1000, 8), 0x0000_0013_02A0_0293);
    }
}
