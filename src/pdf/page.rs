use std::rc::Rc;

use log::debug;

use super::coords;
use super::error::{PdfError, RenderFailure};
use super::guard::{BitmapGuard, HeapBuffer, TextPageGuard};
use super::heap;
use super::library::{PageId, Shared};
use super::native::{FILL_WHITE, Ptr};
use super::pixels::{self, BitmapFormat};
use super::runtime::Runtime;
use super::selection::{SelectionRect, group_rects};
use super::surface::DrawingSurface;
use super::text_query::{SearchHit, find_occurrences};
use super::types::{CharacterBounds, PageSize, PdfRect, Point};
use super::viewport::Viewport;

/// Four f64 out-parameters of the char box query
const CHAR_BOX_SCRATCH: usize = 4 * 8;

/// A loaded page of the resident document.
///
/// Text queries open and close their own text layer; nothing is cached
/// between calls.
pub struct Page {
    shared: Rc<Shared>,
    id: PageId,
    number: usize,
    size: PageSize,
}

impl Page {
    pub(crate) fn new(shared: Rc<Shared>, id: PageId, number: usize, size: PageSize) -> Self {
        Self {
            shared,
            id,
            number,
            size,
        }
    }

    /// 1-based page number
    #[must_use]
    pub fn number(&self) -> usize {
        self.number
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.size.width
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.size.height
    }

    #[must_use]
    pub fn size(&self) -> PageSize {
        self.size
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.page_handle(self.id).is_some()
    }

    /// The native page handle, stable for the life of the page
    pub fn native_handle(&self) -> Result<Ptr, PdfError> {
        self.shared
            .page_handle(self.id)
            .ok_or(PdfError::PageClosed(self.number))
    }

    fn rt(&self) -> &Runtime {
        &self.shared.rt
    }

    /// Rasterizes the page into `surface` at (0, 0).
    ///
    /// The bitmap is `floor(width) x floor(height)` device pixels, filled
    /// white before rendering. On failure the surface keeps whatever it
    /// held before.
    pub fn render(
        &self,
        surface: &mut dyn DrawingSurface,
        viewport: &Viewport,
    ) -> Result<(), PdfError> {
        let page = self.native_handle()?;
        let (width, height) = bitmap_dimensions(viewport)?;
        let rt = self.rt();

        let bitmap = BitmapGuard::create(rt, width, height)?;
        let handle = bitmap.handle();
        if !rt.call(|m| m.bitmap_fill_rect(handle, 0, 0, width, height, FILL_WHITE)) {
            return Err(RenderFailure::Fill.into());
        }
        rt.call(|m| m.render_page_bitmap(handle, page, 0, 0, width, height, 0, 0));

        let buffer = rt.call(|m| m.bitmap_get_buffer(handle));
        if buffer.is_null() {
            return Err(RenderFailure::MissingBuffer.into());
        }
        let stride = usize::try_from(rt.call(|m| m.bitmap_get_stride(handle)))
            .ok()
            .filter(|&s| s > 0)
            .ok_or(RenderFailure::MissingBuffer)?;
        let format = BitmapFormat::from_native(rt.call(|m| m.bitmap_get_format(handle)))?;

        // width and height are at least 1 here
        let (w, h) = (width as u32, height as u32);
        let needed = stride * (h as usize - 1) + w as usize * format.bytes_per_pixel();
        let image = rt.call(|m| -> Result<_, PdfError> {
            let bytes = heap::read_bytes(m.heap(), buffer, needed)?;
            Ok(pixels::to_rgba(bytes, w, h, stride, format)?)
        })?;
        drop(bitmap);

        surface.put_image_data(&image, 0, 0);
        debug!(
            "Rendered page {} at {w}x{h} (scale {}, {:?}, {:?})",
            self.number, viewport.scale, viewport.render_mode, format
        );
        Ok(())
    }

    /// Number of characters on the text layer
    pub fn char_count(&self) -> Result<usize, PdfError> {
        let page = self.native_handle()?;
        let text_page = TextPageGuard::open(self.rt(), page)?;
        Ok(self.count_chars(&text_page))
    }

    fn count_chars(&self, text_page: &TextPageGuard<'_>) -> usize {
        let handle = text_page.handle();
        usize::try_from(self.rt().call(|m| m.text_count_chars(handle))).unwrap_or(0)
    }

    /// All text on the page
    pub fn text(&self) -> Result<String, PdfError> {
        let page = self.native_handle()?;
        let text_page = TextPageGuard::open(self.rt(), page)?;
        let count = self.count_chars(&text_page);
        self.read_text(&text_page, 0, count)
    }

    /// Text of the characters `start..=end`. `end` past the last character
    /// is clamped.
    pub fn text_range(&self, start: usize, end: usize) -> Result<String, PdfError> {
        if start > end {
            return Err(PdfError::TextExtraction(format!(
                "invalid range {start}..={end}"
            )));
        }
        let page = self.native_handle()?;
        let text_page = TextPageGuard::open(self.rt(), page)?;
        let count = self.count_chars(&text_page);
        if start >= count {
            return Err(PdfError::TextExtraction(format!(
                "start index {start} out of range ({count} characters)"
            )));
        }
        let end = end.min(count - 1);
        self.read_text(&text_page, start, end - start + 1)
    }

    fn read_text(
        &self,
        text_page: &TextPageGuard<'_>,
        start: usize,
        count: usize,
    ) -> Result<String, PdfError> {
        let rt = self.rt();
        let units = count + 1;
        let buffer = HeapBuffer::alloc(rt, units * 2)?;
        let (tp, ptr) = (text_page.handle(), buffer.ptr());
        let (start_i, count_i) = (to_native_index(start)?, to_native_index(count)?);

        let written = rt.call(|m| m.text_get_text(tp, start_i, count_i, ptr));
        let written = usize::try_from(written).unwrap_or(0).min(units);
        Ok(decode_utf16(&buffer.read_utf16(written)?))
    }

    /// Text inside a rectangle given in PDF space
    pub fn text_in_rect(&self, rect: PdfRect) -> Result<String, PdfError> {
        let page = self.native_handle()?;
        let rt = self.rt();
        let text_page = TextPageGuard::open(rt, page)?;
        let tp = text_page.handle();
        let PdfRect {
            left,
            top,
            right,
            bottom,
        } = rect;

        let needed =
            rt.call(|m| m.text_get_bounded_text(tp, left, top, right, bottom, Ptr::NULL, 0));
        let needed = usize::try_from(needed).unwrap_or(0);
        if needed == 0 {
            return Ok(String::new());
        }

        let units = needed + 1;
        let buffer = HeapBuffer::alloc(rt, units * 2)?;
        let ptr = buffer.ptr();
        let units_i = to_native_index(units)?;
        let written = rt.call(|m| {
            m.text_get_bounded_text(tp, left, top, right, bottom, ptr, units_i)
        });
        let written = usize::try_from(written).unwrap_or(0).min(units);
        Ok(decode_utf16(&buffer.read_utf16(written)?))
    }

    /// Index of the character under `point` (page units, top-left origin)
    pub fn character_at(&self, point: Point) -> Result<Option<usize>, PdfError> {
        let page = self.native_handle()?;
        let rt = self.rt();
        let text_page = TextPageGuard::open(rt, page)?;
        let tp = text_page.handle();
        let pdf = coords::screen_to_pdf(point, self.size.height);
        let tolerance = self.shared.config.text.hit_tolerance;

        let index =
            rt.call(|m| m.text_get_char_index_at_pos(tp, pdf.x, pdf.y, tolerance, tolerance));
        Ok(usize::try_from(index).ok())
    }

    /// Screen-space bounds of one character; `None` for whitespace and
    /// other positions with no drawable box.
    pub fn character_bounds(&self, index: usize) -> Result<Option<CharacterBounds>, PdfError> {
        Ok(self
            .bounds_in_range(index, index)?
            .into_iter()
            .next()
            .flatten())
    }

    /// Bounds of the characters `start..=end` using one text layer and one
    /// scratch buffer. The range is normalized and clamped to the page.
    pub fn bounds_in_range(
        &self,
        start: usize,
        end: usize,
    ) -> Result<Vec<Option<CharacterBounds>>, PdfError> {
        let page = self.native_handle()?;
        let rt = self.rt();
        let text_page = TextPageGuard::open(rt, page)?;
        let count = self.count_chars(&text_page);
        let (start, end) = (start.min(end), start.max(end));
        if count == 0 || start >= count {
            return Ok(Vec::new());
        }
        let end = end.min(count - 1);

        let scratch = HeapBuffer::alloc(rt, CHAR_BOX_SCRATCH)?;
        (start..=end)
            .map(|index| self.glyph_bounds(&text_page, &scratch, index))
            .collect()
    }

    fn glyph_bounds(
        &self,
        text_page: &TextPageGuard<'_>,
        scratch: &HeapBuffer<'_>,
        index: usize,
    ) -> Result<Option<CharacterBounds>, PdfError> {
        let rt = self.rt();
        let tp = text_page.handle();
        let i = to_native_index(index)?;

        let unicode = rt.call(|m| m.text_get_unicode(tp, i));
        if char::from_u32(unicode).is_none_or(|c| c == '\0' || c.is_whitespace()) {
            return Ok(None);
        }
        let line_height =
            rt.call(|m| m.text_get_font_size(tp, i)) * self.shared.config.text.line_height_factor;

        let (left_at, right_at, bottom_at, top_at) =
            (scratch.at(0)?, scratch.at(8)?, scratch.at(16)?, scratch.at(24)?);
        let found =
            rt.call(|m| m.text_get_char_box(tp, i, left_at, right_at, bottom_at, top_at));
        if !found {
            return Ok(None);
        }
        let left = scratch.read_f64(0)?;
        let right = scratch.read_f64(1)?;
        let bottom = scratch.read_f64(2)?;
        let top = scratch.read_f64(3)?;
        Ok(coords::char_box_to_screen(
            left,
            right,
            bottom,
            top,
            self.size.height,
            line_height,
        ))
    }

    /// Highlight rectangles for the characters `start..=end`
    pub fn selection_rects(&self, start: usize, end: usize) -> Result<Vec<SelectionRect>, PdfError> {
        let bounds: Vec<CharacterBounds> = self
            .bounds_in_range(start, end)?
            .into_iter()
            .flatten()
            .collect();
        Ok(group_rects(&bounds, &self.shared.config.selection))
    }

    /// Case-insensitive search of the page text with highlight rectangles
    pub fn search(&self, term: &str, context: usize) -> Result<Vec<SearchHit>, PdfError> {
        let text = self.text()?;
        find_occurrences(&text, term, context)
            .into_iter()
            .map(|occurrence| {
                let last = occurrence.position + occurrence.length.saturating_sub(1);
                let rects = self.selection_rects(occurrence.position, last)?;
                Ok(SearchHit {
                    page: self.number,
                    occurrence,
                    rects,
                })
            })
            .collect()
    }

    /// Closes the native page if it is still active. Safe to call
    /// repeatedly; never fails.
    pub fn destroy(&self) {
        if self.shared.close_page(self.id) {
            debug!("Destroyed page {}", self.number);
        }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("number", &self.number)
            .field("size", &self.size)
            .field("open", &self.is_open())
            .finish()
    }
}

fn bitmap_dimensions(viewport: &Viewport) -> Result<(i32, i32), PdfError> {
    let invalid = || RenderFailure::InvalidDimensions {
        width: viewport.width,
        height: viewport.height,
    };
    let width = viewport.width.floor();
    let height = viewport.height.floor();
    let limit = f64::from(i32::MAX);
    // NaN fails both comparisons
    if !(width >= 1.0 && height >= 1.0 && width <= limit && height <= limit) {
        return Err(invalid().into());
    }
    Ok((width as i32, height as i32))
}

fn to_native_index(value: usize) -> Result<i32, PdfError> {
    i32::try_from(value)
        .map_err(|_| PdfError::TextExtraction(format!("index {value} exceeds native range")))
}

fn decode_utf16(units: &[u16]) -> String {
    let end = units
        .iter()
        .rposition(|&u| u != 0)
        .map_or(0, |last| last + 1);
    String::from_utf16_lossy(&units[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_are_floored() {
        let viewport = Viewport::new(100.9, 50.2);
        assert_eq!(bitmap_dimensions(&viewport).unwrap(), (100, 50));
    }

    #[test]
    fn sub_pixel_and_non_finite_dimensions_are_rejected() {
        for (w, h) in [(0.5, 10.0), (10.0, 0.0), (f64::NAN, 10.0), (10.0, f64::INFINITY)] {
            let err = bitmap_dimensions(&Viewport::new(w, h)).unwrap_err();
            assert!(matches!(
                err,
                PdfError::Render(RenderFailure::InvalidDimensions { .. })
            ));
        }
    }

    #[test]
    fn terminators_are_trimmed() {
        let units: Vec<u16> = "Hi".encode_utf16().chain([0, 0]).collect();
        assert_eq!(decode_utf16(&units), "Hi");
        assert_eq!(decode_utf16(&[0]), "");
    }
}
