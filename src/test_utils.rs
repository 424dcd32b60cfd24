pub mod test_helpers {
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::rc::Rc;

    use crate::pdf::heap::{self, LinearHeap};
    use crate::pdf::{NativeTrap, PdfiumModule, Ptr, REQUIRED_EXPORTS};

    pub const FORMAT_GRAY: i32 = 1;
    pub const FORMAT_BGR: i32 = 2;
    pub const FORMAT_BGRX: i32 = 3;
    pub const FORMAT_BGRA: i32 = 4;

    /// A glyph in PDF space (origin bottom-left)
    #[derive(Clone, Debug, PartialEq)]
    pub struct MockGlyph {
        pub ch: char,
        pub left: f64,
        pub right: f64,
        pub bottom: f64,
        pub top: f64,
        pub font_size: f64,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct MockPage {
        pub width: f64,
        pub height: f64,
        pub glyphs: Vec<MockGlyph>,
        /// BGRA color the page paints over the whole bitmap, if any
        pub ink: Option<[u8; 4]>,
    }

    impl MockPage {
        pub fn blank(width: f64, height: f64) -> Self {
            Self {
                width,
                height,
                glyphs: Vec::new(),
                ink: None,
            }
        }

        /// One line of text: glyphs 10 units apart, 8 wide, starting at
        /// x = 72 on a baseline at y = 700 with 12-unit type.
        pub fn with_line(width: f64, height: f64, text: &str) -> Self {
            Self::blank(width, height).line(72.0, 700.0, text)
        }

        /// Appends a line of glyphs starting at `x` on `baseline`
        pub fn line(mut self, x: f64, baseline: f64, text: &str) -> Self {
            for (i, ch) in text.chars().enumerate() {
                let left = x + i as f64 * 10.0;
                self.glyphs.push(MockGlyph {
                    ch,
                    left,
                    right: left + 8.0,
                    bottom: baseline,
                    top: baseline + 9.0,
                    font_size: 12.0,
                });
            }
            self
        }

        pub fn ink(mut self, bgra: [u8; 4]) -> Self {
            self.ink = Some(bgra);
            self
        }

        /// Screen-space point (top-left origin) at the middle of glyph `i`
        pub fn glyph_center(&self, index: usize) -> (f64, f64) {
            let g = &self.glyphs[index];
            (
                (g.left + g.right) / 2.0,
                self.height - (g.bottom + g.top) / 2.0,
            )
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct MockDocument {
        pub pages: Vec<MockPage>,
        /// Native error code reported instead of opening
        pub load_error: Option<u32>,
        /// Page indices whose load fails with a page-content error
        pub broken_pages: HashSet<i32>,
    }

    impl MockDocument {
        pub fn new(pages: Vec<MockPage>) -> Self {
            Self {
                pages,
                ..Self::default()
            }
        }

        /// A document that fails to open with `code`
        pub fn failing(code: u32) -> Self {
            Self {
                load_error: Some(code),
                ..Self::default()
            }
        }

        pub fn broken_page(mut self, index: i32) -> Self {
            self.broken_pages.insert(index);
            self
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RenderCall {
        pub page: Ptr,
        pub width: i32,
        pub height: i32,
    }

    /// Observations shared between a mock and the test that built it
    #[derive(Debug, Default)]
    pub struct MockLog {
        pub init_calls: usize,
        pub config_init_calls: usize,
        pub config_version: Option<u32>,
        pub destroy_calls: usize,
        pub live_heap_blocks: usize,
        pub live_documents: usize,
        pub live_pages: usize,
        pub live_bitmaps: usize,
        pub live_text_pages: usize,
        pub renders: Vec<RenderCall>,
        pub bitmap_sizes: Vec<(i32, i32)>,
    }

    /// Read-only view of a [`MockLog`] after the mock has been handed off
    #[derive(Clone, Debug)]
    pub struct MockTrace(Rc<RefCell<MockLog>>);

    impl MockTrace {
        pub fn with<R>(&self, f: impl FnOnce(&MockLog) -> R) -> R {
            f(&self.0.borrow())
        }

        pub fn renders(&self) -> Vec<RenderCall> {
            self.with(|log| log.renders.clone())
        }

        /// Nothing is left open inside the mock
        pub fn all_released(&self) -> bool {
            self.with(|log| {
                log.live_heap_blocks == 0
                    && log.live_documents == 0
                    && log.live_pages == 0
                    && log.live_bitmaps == 0
                    && log.live_text_pages == 0
            })
        }
    }

    #[derive(Clone, Debug)]
    struct Faults {
        missing_exports: Vec<String>,
        config_init_traps: bool,
        init_traps: bool,
        fail_bitmap_create: bool,
        fail_fill: bool,
        fail_text_page: bool,
        null_buffer: bool,
        bitmap_format: i32,
        stride_padding: usize,
        nan_char_boxes: Vec<i32>,
        rejected_char_boxes: Vec<i32>,
    }

    impl Default for Faults {
        fn default() -> Self {
            Self {
                missing_exports: Vec::new(),
                config_init_traps: false,
                init_traps: false,
                fail_bitmap_create: false,
                fail_fill: false,
                fail_text_page: false,
                null_buffer: false,
                bitmap_format: FORMAT_BGRA,
                stride_padding: 0,
                nan_char_boxes: Vec::new(),
                rejected_char_boxes: Vec::new(),
            }
        }
    }

    /// Builder for scripted [`MockPdfium`] modules
    #[derive(Default)]
    pub struct MockPdfiumBuilder {
        documents: Vec<(Vec<u8>, MockDocument)>,
        faults: Faults,
        heap_limit: Option<usize>,
    }

    impl MockPdfiumBuilder {
        /// Bytes that open `document`. Any other bytes fail as malformed.
        pub fn document(mut self, bytes: &[u8], document: MockDocument) -> Self {
            self.documents.push((bytes.to_vec(), document));
            self
        }

        pub fn without_export(mut self, name: &str) -> Self {
            self.faults.missing_exports.push(name.to_string());
            self
        }

        pub fn config_init_traps(mut self) -> Self {
            self.faults.config_init_traps = true;
            self
        }

        pub fn init_traps(mut self) -> Self {
            self.faults.init_traps = true;
            self
        }

        pub fn heap_limit(mut self, bytes: usize) -> Self {
            self.heap_limit = Some(bytes);
            self
        }

        pub fn fail_bitmap_create(mut self) -> Self {
            self.faults.fail_bitmap_create = true;
            self
        }

        pub fn fail_fill(mut self) -> Self {
            self.faults.fail_fill = true;
            self
        }

        pub fn fail_text_page(mut self) -> Self {
            self.faults.fail_text_page = true;
            self
        }

        pub fn null_buffer(mut self) -> Self {
            self.faults.null_buffer = true;
            self
        }

        pub fn bitmap_format(mut self, format: i32) -> Self {
            self.faults.bitmap_format = format;
            self
        }

        /// Extra bytes at the end of every bitmap row
        pub fn stride_padding(mut self, bytes: usize) -> Self {
            self.faults.stride_padding = bytes;
            self
        }

        /// The char box of glyph `index` comes back as NaN on every page
        pub fn nan_char_box(mut self, index: i32) -> Self {
            self.faults.nan_char_boxes.push(index);
            self
        }

        /// The char box query for glyph `index` reports failure
        pub fn reject_char_box(mut self, index: i32) -> Self {
            self.faults.rejected_char_boxes.push(index);
            self
        }

        pub fn build(self) -> (MockPdfium, MockTrace) {
            let log = Rc::new(RefCell::new(MockLog::default()));
            let mock = MockPdfium {
                heap: self.heap_limit.map_or_else(LinearHeap::new, LinearHeap::with_limit),
                documents: self.documents,
                faults: self.faults,
                last_error: 0,
                next_handle: 0x1000,
                open_documents: HashMap::new(),
                open_pages: HashMap::new(),
                bitmaps: HashMap::new(),
                text_pages: HashMap::new(),
                log: Rc::clone(&log),
            };
            (mock, MockTrace(log))
        }
    }

    struct MockBitmap {
        width: i32,
        height: i32,
        stride: usize,
        bpp: usize,
        buffer: Ptr,
    }

    /// Scripted in-memory PDFium module
    pub struct MockPdfium {
        heap: LinearHeap,
        documents: Vec<(Vec<u8>, MockDocument)>,
        faults: Faults,
        last_error: u32,
        next_handle: u32,
        open_documents: HashMap<u32, usize>,
        open_pages: HashMap<u32, (usize, usize)>,
        bitmaps: HashMap<u32, MockBitmap>,
        text_pages: HashMap<u32, (usize, usize)>,
        log: Rc<RefCell<MockLog>>,
    }

    impl MockPdfium {
        pub fn builder() -> MockPdfiumBuilder {
            MockPdfiumBuilder::default()
        }

        fn issue(&mut self) -> Ptr {
            self.next_handle += 8;
            Ptr(self.next_handle)
        }

        fn page(&self, handle: Ptr) -> Option<&MockPage> {
            let (doc, index) = *self.open_pages.get(&handle.0)?;
            self.documents[doc].1.pages.get(index)
        }

        fn text_page(&self, handle: Ptr) -> Option<&MockPage> {
            let (doc, index) = *self.text_pages.get(&handle.0)?;
            self.documents[doc].1.pages.get(index)
        }

        fn glyph(&self, text_page: Ptr, index: i32) -> Option<&MockGlyph> {
            let i = usize::try_from(index).ok()?;
            self.text_page(text_page)?.glyphs.get(i)
        }

        fn note(&self, f: impl FnOnce(&mut MockLog)) {
            f(&mut self.log.borrow_mut());
        }
    }

    fn contains(glyph: &MockGlyph, x: f64, y: f64, xtol: f64, ytol: f64) -> bool {
        x >= glyph.left - xtol
            && x <= glyph.right + xtol
            && y >= glyph.bottom - ytol
            && y <= glyph.top + ytol
    }

    impl PdfiumModule for MockPdfium {
        fn has_export(&self, name: &str) -> bool {
            let known = REQUIRED_EXPORTS.contains(&name) || name == "FPDF_InitLibraryWithConfig";
            known && !self.faults.missing_exports.iter().any(|m| m == name)
        }

        fn malloc(&mut self, size: usize) -> Ptr {
            let ptr = self.heap.alloc(size);
            if !ptr.is_null() {
                self.note(|log| log.live_heap_blocks += 1);
            }
            ptr
        }

        fn free(&mut self, ptr: Ptr) {
            if self.heap.free(ptr) {
                self.note(|log| log.live_heap_blocks -= 1);
            }
        }

        fn heap(&self) -> &[u8] {
            self.heap.bytes()
        }

        fn heap_mut(&mut self) -> &mut [u8] {
            self.heap.bytes_mut()
        }

        fn init_library(&mut self) -> Result<(), NativeTrap> {
            self.note(|log| log.init_calls += 1);
            if self.faults.init_traps {
                return Err(NativeTrap::new("FPDF_InitLibrary", "unreachable executed"));
            }
            Ok(())
        }

        fn init_library_with_config(&mut self, config: Ptr) -> Result<(), NativeTrap> {
            let version = heap::read_bytes(self.heap.bytes(), config, 4)
                .ok()
                .and_then(|b| b.try_into().ok())
                .map(u32::from_le_bytes);
            self.note(|log| {
                log.config_init_calls += 1;
                log.config_version = version;
            });
            if self.faults.config_init_traps {
                return Err(NativeTrap::new(
                    "FPDF_InitLibraryWithConfig",
                    "memory access out of bounds",
                ));
            }
            Ok(())
        }

        fn destroy_library(&mut self) {
            self.note(|log| log.destroy_calls += 1);
        }

        fn get_last_error(&self) -> u32 {
            self.last_error
        }

        fn load_mem_document(&mut self, data: Ptr, size: usize, _password: Ptr) -> Ptr {
            let Ok(bytes) = heap::read_bytes(self.heap.bytes(), data, size) else {
                self.last_error = 2;
                return Ptr::NULL;
            };
            let Some(doc) = self.documents.iter().position(|(b, _)| b == bytes) else {
                self.last_error = 3;
                return Ptr::NULL;
            };
            if let Some(code) = self.documents[doc].1.load_error {
                self.last_error = code;
                return Ptr::NULL;
            }
            let handle = self.issue();
            self.open_documents.insert(handle.0, doc);
            self.note(|log| log.live_documents += 1);
            handle
        }

        fn close_document(&mut self, document: Ptr) {
            if self.open_documents.remove(&document.0).is_some() {
                self.note(|log| log.live_documents -= 1);
            }
        }

        fn get_page_count(&self, document: Ptr) -> i32 {
            self.open_documents
                .get(&document.0)
                .map_or(0, |&doc| self.documents[doc].1.pages.len() as i32)
        }

        fn load_page(&mut self, document: Ptr, index: i32) -> Ptr {
            let Some(&doc) = self.open_documents.get(&document.0) else {
                self.last_error = 1;
                return Ptr::NULL;
            };
            let Ok(i) = usize::try_from(index) else {
                self.last_error = 6;
                return Ptr::NULL;
            };
            let document = &self.documents[doc].1;
            if i >= document.pages.len() || document.broken_pages.contains(&index) {
                self.last_error = 6;
                return Ptr::NULL;
            }
            let handle = self.issue();
            self.open_pages.insert(handle.0, (doc, i));
            self.note(|log| log.live_pages += 1);
            handle
        }

        fn close_page(&mut self, page: Ptr) {
            if self.open_pages.remove(&page.0).is_some() {
                self.note(|log| log.live_pages -= 1);
            }
        }

        fn get_page_width(&self, page: Ptr) -> f64 {
            self.page(page).map_or(0.0, |p| p.width)
        }

        fn get_page_height(&self, page: Ptr) -> f64 {
            self.page(page).map_or(0.0, |p| p.height)
        }

        fn bitmap_create(&mut self, width: i32, height: i32, _alpha: i32) -> Ptr {
            self.note(|log| log.bitmap_sizes.push((width, height)));
            if self.faults.fail_bitmap_create || width <= 0 || height <= 0 {
                return Ptr::NULL;
            }
            let bpp = match self.faults.bitmap_format {
                FORMAT_GRAY => 1,
                FORMAT_BGR => 3,
                _ => 4,
            };
            let stride = width as usize * bpp + self.faults.stride_padding;
            let buffer = self.heap.alloc(stride * height as usize);
            if buffer.is_null() {
                return Ptr::NULL;
            }
            let handle = self.issue();
            self.bitmaps.insert(
                handle.0,
                MockBitmap {
                    width,
                    height,
                    stride,
                    bpp,
                    buffer,
                },
            );
            self.note(|log| log.live_bitmaps += 1);
            handle
        }

        fn bitmap_get_format(&self, _bitmap: Ptr) -> i32 {
            self.faults.bitmap_format
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
            if self.faults.fail_fill {
                return false;
            }
            let Some(bmp) = self.bitmaps.get(&bitmap.0) else {
                return false;
            };
            let [a, r, g, b] = color.to_be_bytes();
            let px: Vec<u8> = match bmp.bpp {
                1 => vec![r],
                3 => vec![b, g, r],
                _ => vec![b, g, r, a],
            };
            let (stride, bpp, buffer) = (bmp.stride, bmp.bpp, bmp.buffer);
            let x1 = (left + width).min(bmp.width).max(0) as usize;
            let y1 = (top + height).min(bmp.height).max(0) as usize;
            let memory = self.heap.bytes_mut();
            for y in top.max(0) as usize..y1 {
                for x in left.max(0) as usize..x1 {
                    let at = buffer.advance((y * stride + x * bpp) as u32);
                    if heap::write_bytes(memory, at, &px).is_err() {
                        return false;
                    }
                }
            }
            true
        }

        fn bitmap_get_buffer(&mut self, bitmap: Ptr) -> Ptr {
            if self.faults.null_buffer {
                return Ptr::NULL;
            }
            self.bitmaps.get(&bitmap.0).map_or(Ptr::NULL, |b| b.buffer)
        }

        fn bitmap_get_stride(&self, bitmap: Ptr) -> i32 {
            self.bitmaps.get(&bitmap.0).map_or(0, |b| b.stride as i32)
        }

        fn bitmap_destroy(&mut self, bitmap: Ptr) {
            if let Some(bmp) = self.bitmaps.remove(&bitmap.0) {
                self.heap.free(bmp.buffer);
                self.note(|log| log.live_bitmaps -= 1);
            }
        }

        fn render_page_bitmap(
            &mut self,
            bitmap: Ptr,
            page: Ptr,
            _start_x: i32,
            _start_y: i32,
            size_x: i32,
            size_y: i32,
            _rotate: i32,
            _flags: i32,
        ) {
            self.note(|log| {
                log.renders.push(RenderCall {
                    page,
                    width: size_x,
                    height: size_y,
                });
            });
            let ink = self.page(page).and_then(|p| p.ink);
            let Some(ink) = ink else {
                return;
            };
            let [b, g, r, a] = ink;
            let color = u32::from_be_bytes([a, r, g, b]);
            let _ = self.bitmap_fill_rect(bitmap, 0, 0, size_x, size_y, color);
        }

        fn text_load_page(&mut self, page: Ptr) -> Ptr {
            if self.faults.fail_text_page {
                self.last_error = 1;
                return Ptr::NULL;
            }
            let Some(&target) = self.open_pages.get(&page.0) else {
                return Ptr::NULL;
            };
            let handle = self.issue();
            self.text_pages.insert(handle.0, target);
            self.note(|log| log.live_text_pages += 1);
            handle
        }

        fn text_close_page(&mut self, text_page: Ptr) {
            if self.text_pages.remove(&text_page.0).is_some() {
                self.note(|log| log.live_text_pages -= 1);
            }
        }

        fn text_count_chars(&self, text_page: Ptr) -> i32 {
            self.text_page(text_page)
                .map_or(-1, |p| p.glyphs.len() as i32)
        }

        fn text_get_text(&mut self, text_page: Ptr, start: i32, count: i32, buffer: Ptr) -> i32 {
            let Some(page) = self.text_page(text_page) else {
                return 0;
            };
            let (Ok(start), Ok(count)) = (usize::try_from(start), usize::try_from(count)) else {
                return 0;
            };
            let mut units: Vec<u16> = page
                .glyphs
                .iter()
                .skip(start)
                .take(count)
                .flat_map(|g| {
                    let mut buf = [0u16; 2];
                    g.ch.encode_utf16(&mut buf).to_vec()
                })
                .collect();
            units.push(0);
            match heap::write_utf16(self.heap.bytes_mut(), buffer, &units) {
                Ok(()) => units.len() as i32,
                Err(_) => 0,
            }
        }

        fn text_get_unicode(&self, text_page: Ptr, index: i32) -> u32 {
            self.glyph(text_page, index).map_or(0, |g| g.ch as u32)
        }

        fn text_get_font_size(&self, text_page: Ptr, index: i32) -> f64 {
            self.glyph(text_page, index).map_or(0.0, |g| g.font_size)
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
            if self.faults.rejected_char_boxes.contains(&index) {
                return false;
            }
            let Some(glyph) = self.glyph(text_page, index) else {
                return false;
            };
            let values = if glyph.ch.is_whitespace() || self.faults.nan_char_boxes.contains(&index) {
                [f64::NAN; 4]
            } else {
                [glyph.left, glyph.right, glyph.bottom, glyph.top]
            };
            let memory = self.heap.bytes_mut();
            [left, right, bottom, top]
                .into_iter()
                .zip(values)
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
            let Some(page) = self.text_page(text_page) else {
                return -3;
            };
            page.glyphs
                .iter()
                .position(|g| contains(g, x, y, 0.0, 0.0))
                .or_else(|| {
                    page.glyphs
                        .iter()
                        .position(|g| contains(g, x, y, x_tolerance, y_tolerance))
                })
                .map_or(-1, |i| i as i32)
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
            let Some(page) = self.text_page(text_page) else {
                return 0;
            };
            let units: Vec<u16> = page
                .glyphs
                .iter()
                .filter(|g| {
                    let cx = (g.left + g.right) / 2.0;
                    let cy = (g.bottom + g.top) / 2.0;
                    cx >= left && cx <= right && cy >= bottom && cy <= top
                })
                .map(|g| g.ch as u16)
                .collect();
            if buffer.is_null() {
                return units.len() as i32;
            }
            let len = usize::try_from(buffer_len).unwrap_or(0).min(units.len());
            match heap::write_utf16(self.heap.bytes_mut(), buffer, &units[..len]) {
                Ok(()) => len as i32,
                Err(_) => 0,
            }
        }
    }

    /// Three US-letter pages; the first reads "Hello World"
    pub fn hello_world_document() -> MockDocument {
        MockDocument::new(vec![
            MockPage::with_line(612.0, 792.0, "Hello World"),
            MockPage::with_line(612.0, 792.0, "Second page"),
            MockPage::blank(612.0, 792.0),
        ])
    }

    pub const HELLO_BYTES: &[u8] = b"%PDF-1.7 hello world";
}
