use image::Rgba;

use folio::pdf::{
    Canvas, Command, Document, DrawingSurface, Library, PageRenderer, PdfError, RenderFailure,
    RenderMode, Viewport, WHITE,
};
use folio::settings::RendererSettings;
use folio::test_utils::test_helpers::{
    FORMAT_BGR, FORMAT_BGRX, FORMAT_GRAY, HELLO_BYTES, MockDocument, MockPage, MockPdfium,
    MockPdfiumBuilder, MockTrace,
};

const INK: [u8; 4] = [10, 20, 30, 200];

fn inked_document() -> MockDocument {
    MockDocument::new(vec![
        MockPage::with_line(612.0, 792.0, "Inked").ink(INK),
        MockPage::blank(300.0, 400.0),
    ])
}

fn open(builder: MockPdfiumBuilder) -> (Library, Document, MockTrace) {
    let (mock, trace) = builder.document(HELLO_BYTES, inked_document()).build();
    let library = Library::initialize(Box::new(mock)).unwrap();
    let document = library.load_document(HELLO_BYTES).unwrap();
    (library, document, trace)
}

fn assert_every_pixel(canvas: &Canvas, expected: Rgba<u8>) {
    for (x, y, px) in canvas.pixels().enumerate_pixels() {
        assert_eq!(*px, expected, "pixel at {x},{y}");
    }
}

#[test]
fn test_bgra_bitmap_becomes_rgba() {
    let (library, document, trace) = open(MockPdfium::builder());
    let page = document.get_page(1).unwrap();

    let mut canvas = Canvas::new(4, 3);
    page.render(&mut canvas, &Viewport::new(4.0, 3.0)).unwrap();
    assert_every_pixel(&canvas, Rgba([30, 20, 10, 200]));

    assert_eq!(trace.renders().len(), 1);
    let stats = library.stats();
    assert_eq!(stats.bitmaps_created, 1);
    assert_eq!(stats.live_bitmaps(), 0);
    trace.with(|log| assert_eq!(log.live_bitmaps, 0));
}

#[test]
fn test_background_is_white() {
    let (_library, document, _trace) = open(MockPdfium::builder());
    let page = document.get_page(2).unwrap();

    let mut canvas = Canvas::new(5, 5);
    page.render(&mut canvas, &Viewport::new(5.0, 5.0)).unwrap();
    assert_every_pixel(&canvas, WHITE);
}

#[test]
fn test_fractional_viewport_is_floored() {
    let (_library, document, trace) = open(MockPdfium::builder());
    let page = document.get_page(2).unwrap();

    let mut canvas = Canvas::new(10, 10);
    page.render(&mut canvas, &Viewport::new(7.9, 3.2)).unwrap();
    trace.with(|log| assert_eq!(log.bitmap_sizes, vec![(7, 3)]));
}

#[test]
fn test_padded_rows_and_opaque_formats() {
    for format in [FORMAT_BGRX, FORMAT_BGR] {
        let (_library, document, _trace) =
            open(MockPdfium::builder().bitmap_format(format).stride_padding(6));
        let page = document.get_page(1).unwrap();

        let mut canvas = Canvas::new(3, 2);
        page.render(&mut canvas, &Viewport::new(3.0, 2.0)).unwrap();
        assert_every_pixel(&canvas, Rgba([30, 20, 10, 255]));
    }
}

#[test]
fn test_gray_bitmap_expands_to_rgba() {
    let (_library, document, _trace) = open(MockPdfium::builder().bitmap_format(FORMAT_GRAY));
    let page = document.get_page(2).unwrap();

    let mut canvas = Canvas::new(2, 2);
    page.render(&mut canvas, &Viewport::new(2.0, 2.0)).unwrap();
    assert_every_pixel(&canvas, WHITE);
}

#[test]
fn test_unknown_format_is_rejected() {
    let (library, document, _trace) = open(MockPdfium::builder().bitmap_format(9));
    let page = document.get_page(1).unwrap();

    let mut canvas = Canvas::new(2, 2);
    let err = page.render(&mut canvas, &Viewport::new(2.0, 2.0)).unwrap_err();
    assert!(matches!(
        err,
        PdfError::Render(RenderFailure::UnsupportedFormat(9))
    ));
    assert_eq!(library.stats().live_bitmaps(), 0);
}

#[test]
fn test_invalid_dimensions_never_reach_the_module() {
    let (_library, document, trace) = open(MockPdfium::builder());
    let page = document.get_page(1).unwrap();

    let mut canvas = Canvas::new(2, 2);
    for viewport in [Viewport::new(0.5, 10.0), Viewport::new(f64::NAN, 10.0)] {
        let err = page.render(&mut canvas, &viewport).unwrap_err();
        assert!(matches!(
            err,
            PdfError::Render(RenderFailure::InvalidDimensions { .. })
        ));
    }
    trace.with(|log| assert!(log.bitmap_sizes.is_empty()));
}

#[test]
fn test_render_failures_release_bitmaps_and_keep_surface() {
    let faults: [(fn(MockPdfiumBuilder) -> MockPdfiumBuilder, RenderFailure); 3] = [
        (
            MockPdfiumBuilder::fail_bitmap_create,
            RenderFailure::BitmapCreate {
                width: 4,
                height: 4,
            },
        ),
        (MockPdfiumBuilder::fail_fill, RenderFailure::Fill),
        (MockPdfiumBuilder::null_buffer, RenderFailure::MissingBuffer),
    ];

    for (fault, expected) in faults {
        let (library, document, trace) = open(fault(MockPdfium::builder()));
        let page = document.get_page(1).unwrap();

        let mut canvas = Canvas::new(4, 4);
        canvas.fill_rect(0, 0, 4, 4, Rgba([1, 2, 3, 4]));
        let err = page.render(&mut canvas, &Viewport::new(4.0, 4.0)).unwrap_err();
        assert!(matches!(&err, PdfError::Render(f) if *f == expected), "{err}");

        assert_every_pixel(&canvas, Rgba([1, 2, 3, 4]));
        let stats = library.stats();
        assert_eq!(stats.live_bitmaps(), 0);
        assert_eq!(stats.live_heap_blocks(), 1);
        trace.with(|log| assert_eq!(log.live_bitmaps, 0));
    }
}

#[test]
fn test_rescaling_reuses_the_loaded_page() {
    let (_library, document, trace) = open(MockPdfium::builder());
    let mut renderer: PageRenderer = PageRenderer::new(2, &RendererSettings::default());

    let failures = renderer.dispatch(
        &document,
        Command::SetVisible {
            page: 0,
            visible: true,
        },
    );
    assert!(failures.is_empty());
    let handle = renderer.view(0).unwrap().page().unwrap().native_handle().unwrap();

    assert!(renderer.dispatch(&document, Command::SetScale(2.0)).is_empty());
    let again = renderer.view(0).unwrap().page().unwrap().native_handle().unwrap();
    assert_eq!(handle, again);

    let renders = trace.renders();
    assert_eq!(renders.len(), 2);
    assert!(renders.iter().all(|call| call.page == handle));
    assert_eq!((renders[0].width, renders[0].height), (1224, 1584));
    assert_eq!((renders[1].width, renders[1].height), (2448, 3168));
    assert_eq!(renderer.view(0).unwrap().surface().size(), (2448, 3168));
    assert_eq!(renderer.css_size(0), (1224.0, 1584.0));
}

#[test]
fn test_normal_mode_renders_at_layout_size() {
    let (_library, document, trace) = open(MockPdfium::builder());
    let mut renderer: PageRenderer = PageRenderer::new(2, &RendererSettings::default());

    renderer.dispatch(
        &document,
        Command::SetVisible {
            page: 0,
            visible: true,
        },
    );
    let failures = renderer.dispatch(&document, Command::SetRenderMode(RenderMode::Normal));
    assert!(failures.is_empty());

    let renders = trace.renders();
    assert_eq!(renders.len(), 2);
    assert_eq!((renders[0].width, renders[0].height), (1224, 1584));
    assert_eq!((renders[1].width, renders[1].height), (612, 792));
    assert_eq!(renderer.view(0).unwrap().surface().size(), (612, 792));
    assert_eq!(renderer.css_size(0), (612.0, 792.0));
}

#[test]
fn test_renderer_fills_white_on_failure() {
    let (_library, document, _trace) = open(MockPdfium::builder().fail_fill());
    let mut renderer: PageRenderer = PageRenderer::new(2, &RendererSettings::default());

    let failures = renderer.dispatch(
        &document,
        Command::SetVisible {
            page: 1,
            visible: true,
        },
    );
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, 1);

    let view = renderer.view(1).unwrap();
    assert!(matches!(
        view.last_error(),
        Some(PdfError::Render(RenderFailure::Fill))
    ));
    assert_eq!(view.surface().size(), (600, 800));
    assert_every_pixel(view.surface(), WHITE);
}

#[test]
fn test_unmount_destroys_page_once() {
    let (library, document, trace) = open(MockPdfium::builder());
    let mut renderer: PageRenderer = PageRenderer::new(2, &RendererSettings::default());

    renderer.dispatch(
        &document,
        Command::SetVisible {
            page: 0,
            visible: true,
        },
    );
    assert_eq!(library.active_page_count(), 1);

    assert!(renderer.dispatch(&document, Command::UnmountAll).is_empty());
    assert!(renderer.dispatch(&document, Command::Unmount(0)).is_empty());
    assert_eq!(library.active_page_count(), 0);
    assert_eq!(library.stats().pages_closed, 1);
    trace.with(|log| assert_eq!(log.live_pages, 0));
}

#[test]
fn test_failed_load_is_retried_on_next_visibility() {
    let (mock, _trace) = MockPdfium::builder()
        .document(HELLO_BYTES, inked_document().broken_page(1))
        .build();
    let library = Library::initialize(Box::new(mock)).unwrap();
    let document = library.load_document(HELLO_BYTES).unwrap();
    let mut renderer: PageRenderer = PageRenderer::new(2, &RendererSettings::default());
    let show = Command::SetVisible {
        page: 1,
        visible: true,
    };

    for _ in 0..2 {
        let failures = renderer.dispatch(&document, show.clone());
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].1, PdfError::PageLoad { page: 2, .. }));
        let view = renderer.view(1).unwrap();
        assert!(view.page().is_none());
        assert!(!view.is_visible());
    }
    assert_eq!(library.active_page_count(), 0);
}
