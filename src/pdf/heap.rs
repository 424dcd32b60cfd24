//! Linear-memory helpers: a first-fit allocator for modules that emulate
//! linear memory, and bounds-checked little-endian accessors.

use std::collections::BTreeMap;

use super::error::PdfError;
use super::native::Ptr;

const ALIGN: usize = 8;

fn align_up(value: usize) -> usize {
    value.div_ceil(ALIGN) * ALIGN
}

/// First-fit allocator over a single growable byte vector.
///
/// Offset 0 is never handed out so that [`Ptr::NULL`] stays a failure value.
#[derive(Debug)]
pub struct LinearHeap {
    memory: Vec<u8>,
    /// Live blocks: offset -> rounded size
    blocks: BTreeMap<u32, usize>,
    limit: Option<usize>,
}

impl Default for LinearHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearHeap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: vec![0; ALIGN],
            blocks: BTreeMap::new(),
            limit: None,
        }
    }

    /// Heap that refuses to grow past `limit` bytes
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Allocates a zeroed block, or returns `Ptr::NULL` when the limit
    /// would be exceeded.
    pub fn alloc(&mut self, size: usize) -> Ptr {
        let size = align_up(size.max(1));
        let mut cursor = ALIGN;
        for (&start, &len) in &self.blocks {
            let start = start as usize;
            if start - cursor >= size {
                break;
            }
            cursor = align_up(start + len);
        }

        let end = cursor + size;
        if self.limit.is_some_and(|limit| end > limit) || end > u32::MAX as usize {
            return Ptr::NULL;
        }
        if end > self.memory.len() {
            self.memory.resize(end, 0);
        }
        self.memory[cursor..end].fill(0);
        self.blocks.insert(cursor as u32, size);
        Ptr(cursor as u32)
    }

    /// Releases a block. Returns false for unknown or already freed pointers.
    pub fn free(&mut self, ptr: Ptr) -> bool {
        self.blocks.remove(&ptr.0).is_some()
    }

    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn block_size(&self, ptr: Ptr) -> Option<usize> {
        self.blocks.get(&ptr.0).copied()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.memory
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }
}

fn range(heap_len: usize, ptr: Ptr, len: usize) -> Result<std::ops::Range<usize>, PdfError> {
    let start = ptr.offset();
    match start.checked_add(len) {
        Some(end) if !ptr.is_null() && end <= heap_len => Ok(start..end),
        _ => Err(PdfError::HeapAccess { ptr, len }),
    }
}

pub fn read_bytes(heap: &[u8], ptr: Ptr, len: usize) -> Result<&[u8], PdfError> {
    let range = range(heap.len(), ptr, len)?;
    Ok(&heap[range])
}

pub fn write_bytes(heap: &mut [u8], ptr: Ptr, data: &[u8]) -> Result<(), PdfError> {
    let range = range(heap.len(), ptr, data.len())?;
    heap[range].copy_from_slice(data);
    Ok(())
}

pub fn read_f64(heap: &[u8], ptr: Ptr) -> Result<f64, PdfError> {
    let bytes = read_bytes(heap, ptr, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(f64::from_le_bytes(raw))
}

pub fn write_f64(heap: &mut [u8], ptr: Ptr, value: f64) -> Result<(), PdfError> {
    write_bytes(heap, ptr, &value.to_le_bytes())
}

pub fn read_utf16(heap: &[u8], ptr: Ptr, units: usize) -> Result<Vec<u16>, PdfError> {
    let bytes = read_bytes(heap, ptr, units * 2)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

pub fn write_utf16(heap: &mut [u8], ptr: Ptr, units: &[u16]) -> Result<(), PdfError> {
    let bytes: Vec<u8> = units.iter().flat_map(|unit| unit.to_le_bytes()).collect();
    write_bytes(heap, ptr, &bytes)
}
