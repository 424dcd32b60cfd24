//! RAII ownership of transient native resources.
//!
//! One guard type per resource class. Each releases its resource on drop,
//! so `?` early returns and panics cannot leak native memory.

use log::error;

use super::error::{PdfError, RenderFailure};
use super::heap;
use super::metrics::Event;
use super::native::Ptr;
use super::runtime::Runtime;

/// A `malloc`ed block of linear memory
pub(crate) struct HeapBuffer<'rt> {
    rt: &'rt Runtime,
    ptr: Ptr,
    len: usize,
    owned: bool,
}

impl<'rt> HeapBuffer<'rt> {
    pub fn alloc(rt: &'rt Runtime, len: usize) -> Result<Self, PdfError> {
        let ptr = rt.call(|m| m.malloc(len));
        if ptr.is_null() {
            return Err(PdfError::Allocation { size: len });
        }
        rt.record(Event::HeapAlloc);
        Ok(Self {
            rt,
            ptr,
            len,
            owned: true,
        })
    }

    /// Takes back ownership of a block previously released with
    /// [`HeapBuffer::into_raw`], so that dropping it frees the block.
    pub fn adopt(rt: &'rt Runtime, ptr: Ptr, len: usize) -> Self {
        Self {
            rt,
            ptr,
            len,
            owned: !ptr.is_null(),
        }
    }

    pub fn ptr(&self) -> Ptr {
        self.ptr
    }

    /// Pointer to the byte `offset` bytes into the block. Offsets past the
    /// end of the block fail with [`PdfError::HeapAccess`].
    pub fn at(&self, offset: usize) -> Result<Ptr, PdfError> {
        self.check(offset)?;
        let bytes = u32::try_from(offset).map_err(|_| PdfError::HeapAccess {
            ptr: self.ptr,
            len: offset,
        })?;
        Ok(self.ptr.advance(bytes))
    }

    pub fn write(&self, data: &[u8]) -> Result<(), PdfError> {
        self.check(data.len())?;
        self.rt
            .call(|m| heap::write_bytes(m.heap_mut(), self.ptr, data))
    }

    pub fn read_utf16(&self, units: usize) -> Result<Vec<u16>, PdfError> {
        self.check(units * 2)?;
        self.rt.call(|m| heap::read_utf16(m.heap(), self.ptr, units))
    }

    /// Reads the `index`th f64 slot of the block
    pub fn read_f64(&self, index: usize) -> Result<f64, PdfError> {
        self.check((index + 1) * 8)?;
        let at = self.at(index * 8)?;
        self.rt.call(|m| heap::read_f64(m.heap(), at))
    }

    /// Hands ownership to the caller; the block is no longer freed on drop.
    pub fn into_raw(mut self) -> Ptr {
        self.owned = false;
        self.ptr
    }

    fn check(&self, len: usize) -> Result<(), PdfError> {
        if len > self.len {
            return Err(PdfError::HeapAccess { ptr: self.ptr, len });
        }
        Ok(())
    }
}

impl Drop for HeapBuffer<'_> {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        let ptr = self.ptr;
        match self.rt.try_call(|m| m.free(ptr)) {
            Some(()) => self.rt.record(Event::HeapFree),
            None => error!("Failed to free native buffer {ptr}: module busy"),
        }
    }
}

/// A native bitmap, destroyed on drop
pub(crate) struct BitmapGuard<'rt> {
    rt: &'rt Runtime,
    handle: Ptr,
}

impl<'rt> BitmapGuard<'rt> {
    pub fn create(rt: &'rt Runtime, width: i32, height: i32) -> Result<Self, PdfError> {
        let handle = rt.call(|m| m.bitmap_create(width, height, 0));
        if handle.is_null() {
            return Err(RenderFailure::BitmapCreate { width, height }.into());
        }
        rt.record(Event::BitmapCreate);
        Ok(Self { rt, handle })
    }

    pub fn handle(&self) -> Ptr {
        self.handle
    }
}

impl Drop for BitmapGuard<'_> {
    fn drop(&mut self) {
        let handle = self.handle;
        match self.rt.try_call(|m| m.bitmap_destroy(handle)) {
            Some(()) => self.rt.record(Event::BitmapDestroy),
            None => error!("Failed to destroy bitmap {handle}: module busy"),
        }
    }
}

/// A text-layer handle, opened and closed within one query
pub(crate) struct TextPageGuard<'rt> {
    rt: &'rt Runtime,
    handle: Ptr,
}

impl<'rt> TextPageGuard<'rt> {
    pub fn open(rt: &'rt Runtime, page: Ptr) -> Result<Self, PdfError> {
        let handle = rt.call(|m| m.text_load_page(page));
        if handle.is_null() {
            let code = rt.last_error();
            return Err(PdfError::TextExtraction(format!(
                "failed to load text page: {code}"
            )));
        }
        rt.record(Event::TextPageOpen);
        Ok(Self { rt, handle })
    }

    pub fn handle(&self) -> Ptr {
        self.handle
    }
}

impl Drop for TextPageGuard<'_> {
    fn drop(&mut self) {
        let handle = self.handle;
        match self.rt.try_call(|m| m.text_close_page(handle)) {
            Some(()) => self.rt.record(Event::TextPageClose),
            None => error!("Failed to close text page {handle}: module busy"),
        }
    }
}
