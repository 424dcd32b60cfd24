//! [`PdfiumModule`] over a dynamically loaded PDFium library.
//!
//! PDFium works on process memory, so this backend keeps its own
//! [`LinearHeap`] as the module's linear memory and copies data across at
//! the boundary: document bytes in, bitmap pixels and text out. Native
//! objects are exposed as small integer handles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use pdfium_render::prelude::{
    FPDF_BITMAP, FPDF_DOCUMENT, FPDF_PAGE, FPDF_TEXTPAGE, Pdfium, PdfiumLibraryBindings,
};

use super::bootstrap::ModuleLoader;
use super::error::PdfError;
use super::heap::{self, LinearHeap};
use super::native::{INIT_WITH_CONFIG_EXPORT, NativeTrap, PdfiumModule, Ptr, REQUIRED_EXPORTS};

struct LoadedDocument {
    raw: FPDF_DOCUMENT,
    // PDFium reads from this for as long as the document is open
    _bytes: Box<[u8]>,
}

struct LoadedBitmap {
    raw: FPDF_BITMAP,
    /// Copy of the pixel buffer in linear memory, once requested
    copy: Option<Ptr>,
}

pub struct PdfiumBackend {
    bindings: Box<dyn PdfiumLibraryBindings>,
    heap: LinearHeap,
    next_handle: u32,
    documents: HashMap<u32, LoadedDocument>,
    pages: HashMap<u32, FPDF_PAGE>,
    bitmaps: HashMap<u32, LoadedBitmap>,
    text_pages: HashMap<u32, FPDF_TEXTPAGE>,
}

impl PdfiumBackend {
    #[must_use]
    pub fn new(bindings: Box<dyn PdfiumLibraryBindings>) -> Self {
        Self {
            bindings,
            heap: LinearHeap::new(),
            next_handle: 0,
            documents: HashMap::new(),
            pages: HashMap::new(),
            bitmaps: HashMap::new(),
            text_pages: HashMap::new(),
        }
    }

    /// Binds to the PDFium library at `path` (a file, or a directory holding
    /// the platform's library name), or the system library when `None`.
    pub fn bind(path: Option<&Path>) -> Result<Self, PdfError> {
        let bindings = match path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| PdfError::Initialization(format!("failed to bind PDFium: {e}")))?;
        Ok(Self::new(bindings))
    }

    fn issue(&mut self) -> Ptr {
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        Ptr(self.next_handle)
    }

    fn document(&self, handle: Ptr) -> Option<FPDF_DOCUMENT> {
        self.documents.get(&handle.0).map(|doc| doc.raw)
    }

    fn page(&self, handle: Ptr) -> Option<FPDF_PAGE> {
        self.pages.get(&handle.0).copied()
    }

    fn bitmap(&self, handle: Ptr) -> Option<FPDF_BITMAP> {
        self.bitmaps.get(&handle.0).map(|bitmap| bitmap.raw)
    }

    fn text_page(&self, handle: Ptr) -> Option<FPDF_TEXTPAGE> {
        self.text_pages.get(&handle.0).copied()
    }

    fn read_c_string(&self, ptr: Ptr) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let tail = self.heap.bytes().get(ptr.offset()..)?;
        let end = tail.iter().position(|&b| b == 0)?;
        String::from_utf8(tail[..end].to_vec()).ok()
    }

    fn write_units(&mut self, buffer: Ptr, units: &[u16]) -> bool {
        heap::write_utf16(self.heap.bytes_mut(), buffer, units).is_ok()
    }
}

impl PdfiumModule for PdfiumBackend {
    fn has_export(&self, name: &str) -> bool {
        // the dynamic bindings resolve every required symbol up front
        REQUIRED_EXPORTS.contains(&name)
    }

    fn malloc(&mut self, size: usize) -> Ptr {
        self.heap.alloc(size)
    }

    fn free(&mut self, ptr: Ptr) {
        if !self.heap.free(ptr) {
            warn!("Ignoring free of unknown block {ptr}");
        }
    }

    fn heap(&self) -> &[u8] {
        self.heap.bytes()
    }

    fn heap_mut(&mut self) -> &mut [u8] {
        self.heap.bytes_mut()
    }

    fn init_library(&mut self) -> Result<(), NativeTrap> {
        self.bindings.FPDF_InitLibrary();
        Ok(())
    }

    fn init_library_with_config(&mut self, _config: Ptr) -> Result<(), NativeTrap> {
        Err(NativeTrap::new(
            INIT_WITH_CONFIG_EXPORT,
            "configured initialization is not available through dynamic bindings",
        ))
    }

    fn destroy_library(&mut self) {
        self.bindings.FPDF_DestroyLibrary();
    }

    fn get_last_error(&self) -> u32 {
        u32::try_from(self.bindings.FPDF_GetLastError()).unwrap_or(1)
    }

    fn load_mem_document(&mut self, data: Ptr, size: usize, password: Ptr) -> Ptr {
        let Ok(bytes) = heap::read_bytes(self.heap.bytes(), data, size) else {
            return Ptr::NULL;
        };
        let bytes: Box<[u8]> = bytes.into();
        let password = self.read_c_string(password);
        let raw = self
            .bindings
            .FPDF_LoadMemDocument(&bytes, password.as_deref());
        if raw.is_null() {
            return Ptr::NULL;
        }
        let handle = self.issue();
        self.documents.insert(
            handle.0,
            LoadedDocument {
                raw,
                _bytes: bytes,
            },
        );
        handle
    }

    fn close_document(&mut self, document: Ptr) {
        if let Some(doc) = self.documents.remove(&document.0) {
            self.bindings.FPDF_CloseDocument(doc.raw);
        }
    }

    fn get_page_count(&self, document: Ptr) -> i32 {
        self.document(document)
            .map_or(0, |raw| self.bindings.FPDF_GetPageCount(raw))
    }

    fn load_page(&mut self, document: Ptr, index: i32) -> Ptr {
        let Some(doc) = self.document(document) else {
            return Ptr::NULL;
        };
        let raw = self.bindings.FPDF_LoadPage(doc, index);
        if raw.is_null() {
            return Ptr::NULL;
        }
        let handle = self.issue();
        self.pages.insert(handle.0, raw);
        handle
    }

    fn close_page(&mut self, page: Ptr) {
        if let Some(raw) = self.pages.remove(&page.0) {
            self.bindings.FPDF_ClosePage(raw);
        }
    }

    fn get_page_width(&self, page: Ptr) -> f64 {
        self.page(page)
            .map_or(0.0, |raw| self.bindings.FPDF_GetPageWidth(raw))
    }

    fn get_page_height(&self, page: Ptr) -> f64 {
        self.page(page)
            .map_or(0.0, |raw| self.bindings.FPDF_GetPageHeight(raw))
    }

    fn bitmap_create(&mut self, width: i32, height: i32, alpha: i32) -> Ptr {
        let raw = self.bindings.FPDFBitmap_Create(width, height, alpha);
        if raw.is_null() {
            return Ptr::NULL;
        }
        let handle = self.issue();
        self.bitmaps.insert(handle.0, LoadedBitmap { raw, copy: None });
        handle
    }

    fn bitmap_get_format(&self, bitmap: Ptr) -> i32 {
        self.bitmap(bitmap)
            .map_or(0, |raw| self.bindings.FPDFBitmap_GetFormat(raw))
    }

    fn bitmap_fill_rect(
        &mut self,
        bitmap: Ptr,
        left: i32,
        top: i32,
        width: i32,
        height: i32,
        color: u32,
    ) -> bool {
        self.bitmap(bitmap).is_some_and(|raw| {
            self.bindings
                .FPDFBitmap_FillRect(raw, left, top, width, height, color.into())
                != 0
        })
    }

    fn bitmap_get_buffer(&mut self, bitmap: Ptr) -> Ptr {
        let Some(raw) = self.bitmap(bitmap) else {
            return Ptr::NULL;
        };
        let pixels = self.bindings.FPDFBitmap_GetBuffer_as_vec(raw);
        let previous = self
            .bitmaps
            .get_mut(&bitmap.0)
            .and_then(|entry| entry.copy.take());
        if let Some(previous) = previous {
            self.heap.free(previous);
        }

        let copy = self.heap.alloc(pixels.len());
        if copy.is_null() || heap::write_bytes(self.heap.bytes_mut(), copy, &pixels).is_err() {
            return Ptr::NULL;
        }
        if let Some(entry) = self.bitmaps.get_mut(&bitmap.0) {
            entry.copy = Some(copy);
        }
        copy
    }

    fn bitmap_get_stride(&self, bitmap: Ptr) -> i32 {
        self.bitmap(bitmap)
            .map_or(0, |raw| self.bindings.FPDFBitmap_GetStride(raw))
    }

    fn bitmap_destroy(&mut self, bitmap: Ptr) {
        if let Some(entry) = self.bitmaps.remove(&bitmap.0) {
            if let Some(copy) = entry.copy {
                self.heap.free(copy);
            }
            self.bindings.FPDFBitmap_Destroy(entry.raw);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_page_bitmap(
        &mut self,
        bitmap: Ptr,
        page: Ptr,
        start_x: i32,
        start_y: i32,
        size_x: i32,
        size_y: i32,
        rotate: i32,
        flags: i32,
    ) {
        if let (Some(bmp), Some(pg)) = (self.bitmap(bitmap), self.page(page)) {
            self.bindings
                .FPDF_RenderPageBitmap(bmp, pg, start_x, start_y, size_x, size_y, rotate, flags);
        }
    }

    fn text_load_page(&mut self, page: Ptr) -> Ptr {
        let Some(pg) = self.page(page) else {
            return Ptr::NULL;
        };
        let raw = self.bindings.FPDFText_LoadPage(pg);
        if raw.is_null() {
            return Ptr::NULL;
        }
        let handle = self.issue();
        self.text_pages.insert(handle.0, raw);
        handle
    }

    fn text_close_page(&mut self, text_page: Ptr) {
        if let Some(raw) = self.text_pages.remove(&text_page.0) {
            self.bindings.FPDFText_ClosePage(raw);
        }
    }

    fn text_count_chars(&self, text_page: Ptr) -> i32 {
        self.text_page(text_page)
            .map_or(-1, |raw| self.bindings.FPDFText_CountChars(raw))
    }

    fn text_get_text(&mut self, text_page: Ptr, start: i32, count: i32, buffer: Ptr) -> i32 {
        let Some(raw) = self.text_page(text_page) else {
            return 0;
        };
        let Ok(len) = usize::try_from(count) else {
            return 0;
        };
        let mut units = vec![0u16; len + 1];
        let written = self
            .bindings
            .FPDFText_GetText(raw, start, count, units.as_mut_ptr());
        let kept = usize::try_from(written).unwrap_or(0).min(units.len());
        if !self.write_units(buffer, &units[..kept]) {
            return 0;
        }
        written
    }

    fn text_get_unicode(&self, text_page: Ptr, index: i32) -> u32 {
        self.text_page(text_page)
            .map_or(0, |raw| self.bindings.FPDFText_GetUnicode(raw, index))
    }

    fn text_get_font_size(&self, text_page: Ptr, index: i32) -> f64 {
        self.text_page(text_page)
            .map_or(0.0, |raw| self.bindings.FPDFText_GetFontSize(raw, index))
    }

    fn text_get_char_box(
        &mut self,
        text_page: Ptr,
        index: i32,
        left: Ptr,
        right: Ptr,
        bottom: Ptr,
        top: Ptr,
    ) -> bool {
        let Some(raw) = self.text_page(text_page) else {
            return false;
        };
        let (mut l, mut r, mut b, mut t) = (0.0, 0.0, 0.0, 0.0);
        let found = self
            .bindings
            .FPDFText_GetCharBox(raw, index, &mut l, &mut r, &mut b, &mut t)
            != 0;
        if !found {
            return false;
        }
        let memory = self.heap.bytes_mut();
        [(left, l), (right, r), (bottom, b), (top, t)]
            .into_iter()
            .all(|(ptr, value)| heap::write_f64(memory, ptr, value).is_ok())
    }

    fn text_get_char_index_at_pos(
        &self,
        text_page: Ptr,
        x: f64,
        y: f64,
        x_tolerance: f64,
        y_tolerance: f64,
    ) -> i32 {
        self.text_page(text_page).map_or(-3, |raw| {
            self.bindings
                .FPDFText_GetCharIndexAtPos(raw, x, y, x_tolerance, y_tolerance)
        })
    }

    fn text_get_bounded_text(
        &mut self,
        text_page: Ptr,
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
        buffer: Ptr,
        buffer_len: i32,
    ) -> i32 {
        let Some(raw) = self.text_page(text_page) else {
            return 0;
        };
        if buffer.is_null() {
            return self.bindings.FPDFText_GetBoundedText(
                raw,
                left,
                top,
                right,
                bottom,
                std::ptr::null_mut(),
                0,
            );
        }
        let Ok(len) = usize::try_from(buffer_len) else {
            return 0;
        };
        let mut units = vec![0u16; len];
        let written = self.bindings.FPDFText_GetBoundedText(
            raw,
            left,
            top,
            right,
            bottom,
            units.as_mut_ptr(),
            buffer_len,
        );
        let kept = usize::try_from(written).unwrap_or(0).min(len);
        if !self.write_units(buffer, &units[..kept]) {
            return 0;
        }
        written
    }
}

impl Drop for PdfiumBackend {
    fn drop(&mut self) {
        let leaked =
            self.documents.len() + self.pages.len() + self.bitmaps.len() + self.text_pages.len();
        if leaked > 0 {
            warn!("PDFium backend dropped with {leaked} open native objects");
        }
    }
}

/// Loads PDFium from a path or the system library search path
#[derive(Default)]
pub struct PdfiumLoader {
    path: Option<PathBuf>,
    bound: Option<PdfiumBackend>,
    last_error: Option<String>,
}

impl PdfiumLoader {
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }
}

impl ModuleLoader for PdfiumLoader {
    fn is_ready(&mut self) -> bool {
        if self.bound.is_some() {
            return true;
        }
        match PdfiumBackend::bind(self.path.as_deref()) {
            Ok(backend) => {
                debug!("Bound PDFium from {:?}", self.path);
                self.bound = Some(backend);
                true
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                false
            }
        }
    }

    fn instantiate(&mut self) -> Result<Box<dyn PdfiumModule>, PdfError> {
        match self.bound.take() {
            Some(backend) => Ok(Box::new(backend)),
            None => Err(PdfError::Initialization(
                self.last_error
                    .take()
                    .unwrap_or_else(|| "PDFium library not bound".to_string()),
            )),
        }
    }
}
