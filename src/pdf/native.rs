//! The native PDF module boundary: a C-style function table over a linear memory.
//!
//! Every handle crossing this boundary is a 32-bit offset ([`Ptr`]). A zero
//! handle means the native call failed; the reason is then available from
//! [`PdfiumModule::get_last_error`].

use std::fmt;

/// Offset into the module's linear memory. `Ptr::NULL` is the failure value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ptr(pub u32);

impl Ptr {
    pub const NULL: Ptr = Ptr(0);

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Byte offset from this pointer; saturates instead of wrapping.
    #[must_use]
    pub const fn advance(self, bytes: u32) -> Ptr {
        Ptr(self.0.saturating_add(bytes))
    }

    #[must_use]
    pub const fn offset(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// A trap raised by the module while executing an entry point.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("native trap in {function}: {message}")]
pub struct NativeTrap {
    pub function: &'static str,
    pub message: String,
}

impl NativeTrap {
    pub fn new(function: &'static str, message: impl Into<String>) -> Self {
        Self {
            function,
            message: message.into(),
        }
    }
}

/// Entry points the wrapper refuses to start without.
///
/// `FPDF_InitLibraryWithConfig` is deliberately absent: it is looked up at
/// start-up and plain `FPDF_InitLibrary` is used when it is missing.
pub const REQUIRED_EXPORTS: &[&str] = &[
    "malloc",
    "free",
    "FPDF_InitLibrary",
    "FPDF_DestroyLibrary",
    "FPDF_GetLastError",
    "FPDF_LoadMemDocument",
    "FPDF_CloseDocument",
    "FPDF_GetPageCount",
    "FPDF_LoadPage",
    "FPDF_ClosePage",
    "FPDF_GetPageWidth",
    "FPDF_GetPageHeight",
    "FPDF_RenderPageBitmap",
    "FPDFBitmap_Create",
    "FPDFBitmap_GetFormat",
    "FPDFBitmap_FillRect",
    "FPDFBitmap_GetBuffer",
    "FPDFBitmap_GetStride",
    "FPDFBitmap_Destroy",
    "FPDFText_LoadPage",
    "FPDFText_ClosePage",
    "FPDFText_CountChars",
    "FPDFText_GetText",
    "FPDFText_GetUnicode",
    "FPDFText_GetFontSize",
    "FPDFText_GetCharBox",
    "FPDFText_GetCharIndexAtPos",
    "FPDFText_GetBoundedText",
];

pub const INIT_WITH_CONFIG_EXPORT: &str = "FPDF_InitLibraryWithConfig";

/// Size in bytes of the library config block passed to configured init.
pub const LIBRARY_CONFIG_SIZE: usize = 16;

/// Version written into the first u32 of the config block.
pub const LIBRARY_CONFIG_VERSION: u32 = 2;

/// Opaque white in 8888 ARGB.
pub const FILL_WHITE: u32 = 0xFFFF_FFFF;

/// Function table of a PDFium-compatible module.
///
/// Calls are synchronous and must never be re-entered. Out-parameters
/// (character boxes, text buffers) are written into linear memory at the
/// offsets the caller allocated with [`PdfiumModule::malloc`].
pub trait PdfiumModule {
    /// Whether the module exposes the named entry point
    fn has_export(&self, name: &str) -> bool;

    // Linear memory
    fn malloc(&mut self, size: usize) -> Ptr;
    fn free(&mut self, ptr: Ptr);
    fn heap(&self) -> &[u8];
    fn heap_mut(&mut self) -> &mut [u8];

    // Library lifecycle
    fn init_library(&mut self) -> Result<(), NativeTrap>;
    fn init_library_with_config(&mut self, config: Ptr) -> Result<(), NativeTrap>;
    fn destroy_library(&mut self);
    fn get_last_error(&self) -> u32;

    // Documents and pages
    fn load_mem_document(&mut self, data: Ptr, size: usize, password: Ptr) -> Ptr;
    fn close_document(&mut self, document: Ptr);
    fn get_page_count(&self, document: Ptr) -> i32;
    fn load_page(&mut self, document: Ptr, index: i32) -> Ptr;
    fn close_page(&mut self, page: Ptr);
    fn get_page_width(&self, page: Ptr) -> f64;
    fn get_page_height(&self, page: Ptr) -> f64;

    // Bitmaps
    fn bitmap_create(&mut self, width: i32, height: i32, alpha: i32) -> Ptr;
    fn bitmap_get_format(&self, bitmap: Ptr) -> i32;
    fn bitmap_fill_rect(
        &mut self,
        bitmap: Ptr,
        left: i32,
        top: i32,
        width: i32,
        height: i32,
        color: u32,
    ) -> bool;
    fn bitmap_get_buffer(&mut self, bitmap: Ptr) -> Ptr;
    fn bitmap_get_stride(&self, bitmap: Ptr) -> i32;
    fn bitmap_destroy(&mut self, bitmap: Ptr);
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
    );

    // Text layer
    fn text_load_page(&mut self, page: Ptr) -> Ptr;
    fn text_close_page(&mut self, text_page: Ptr);
    fn text_count_chars(&self, text_page: Ptr) -> i32;
    /// Writes `count` UTF-16 units plus a terminator at `buffer`; returns
    /// units written including the terminator.
    fn text_get_text(&mut self, text_page: Ptr, start: i32, count: i32, buffer: Ptr) -> i32;
    fn text_get_unicode(&self, text_page: Ptr, index: i32) -> u32;
    fn text_get_font_size(&self, text_page: Ptr, index: i32) -> f64;
    /// Writes four little-endian f64 values (left, right, bottom, top).
    #[allow(clippy::too_many_arguments)]
    fn text_get_char_box(
        &mut self,
        text_page: Ptr,
        index: i32,
        left: Ptr,
        right: Ptr,
        bottom: Ptr,
        top: Ptr,
    ) -> bool;
    /// Returns a negative value when no character is within tolerance.
    fn text_get_char_index_at_pos(
        &self,
        text_page: Ptr,
        x: f64,
        y: f64,
        x_tolerance: f64,
        y_tolerance: f64,
    ) -> i32;
    /// With a null buffer returns the number of UTF-16 units in the
    /// rectangle; otherwise copies at most `buffer_len` units.
    #[allow(clippy::too_many_arguments)]
    fn text_get_bounded_text(
        &mut self,
        text_page: Ptr,
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
        buffer: Ptr,
        buffer_len: i32,
    ) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer_is_zero() {
        assert!(Ptr::NULL.is_null());
        assert!(!Ptr(8).is_null());
        assert_eq!(Ptr::default(), Ptr::NULL);
    }

    #[test]
    fn advance_saturates() {
        assert_eq!(Ptr(8).advance(16), Ptr(24));
        assert_eq!(Ptr(u32::MAX - 1).advance(16), Ptr(u32::MAX));
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(Ptr(255).to_string(), "0x000000ff");
    }

    #[test]
    fn configured_init_is_optional() {
        assert!(!REQUIRED_EXPORTS.contains(&INIT_WITH_CONFIG_EXPORT));
        assert!(REQUIRED_EXPORTS.contains(&"FPDF_InitLibrary"));
    }
}
