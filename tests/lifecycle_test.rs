use folio::pdf::{ErrorCode, LIBRARY_CONFIG_VERSION, Library, PdfError};
use folio::test_utils::test_helpers::{
    HELLO_BYTES, MockDocument, MockPage, MockPdfium, MockPdfiumBuilder, MockTrace,
    hello_world_document,
};

fn start(builder: MockPdfiumBuilder) -> (Library, MockTrace) {
    let (mock, trace) = builder.build();
    let library = Library::initialize(Box::new(mock)).expect("library should initialize");
    (library, trace)
}

fn hello() -> (Library, MockTrace) {
    start(MockPdfium::builder().document(HELLO_BYTES, hello_world_document()))
}

#[test]
fn test_configured_init_writes_version_block() {
    let (_library, trace) = hello();
    trace.with(|log| {
        assert_eq!(log.config_init_calls, 1);
        assert_eq!(log.config_version, Some(LIBRARY_CONFIG_VERSION));
        assert_eq!(log.init_calls, 0);
        // the config block is freed again
        assert_eq!(log.live_heap_blocks, 0);
    });
}

#[test]
fn test_trapping_configured_init_falls_back() {
    let (library, trace) = start(MockPdfium::builder().config_init_traps());
    assert!(library.is_alive());
    trace.with(|log| {
        assert_eq!(log.config_init_calls, 1);
        assert_eq!(log.init_calls, 1);
    });
}

#[test]
fn test_missing_configured_init_export_falls_back() {
    let (_library, trace) = start(MockPdfium::builder().without_export("FPDF_InitLibraryWithConfig"));
    trace.with(|log| {
        assert_eq!(log.config_init_calls, 0);
        assert_eq!(log.init_calls, 1);
    });
}

#[test]
fn test_both_inits_failing_is_an_initialization_error() {
    let (mock, _trace) = MockPdfium::builder()
        .config_init_traps()
        .init_traps()
        .build();
    let err = Library::initialize(Box::new(mock)).unwrap_err();
    assert!(matches!(err, PdfError::Initialization(_)));
}

#[test]
fn test_missing_required_export_is_reported() {
    let (mock, trace) = MockPdfium::builder().without_export("FPDF_LoadPage").build();
    let err = Library::initialize(Box::new(mock)).unwrap_err();
    assert!(err.to_string().contains("FPDF_LoadPage"));
    trace.with(|log| assert_eq!(log.init_calls + log.config_init_calls, 0));
}

#[test]
fn test_page_count_matches_module() {
    let (library, _trace) = hello();
    let document = library.load_document(HELLO_BYTES).unwrap();
    assert_eq!(document.page_count(), 3);

    let page = document.get_page(1).unwrap();
    assert_eq!((page.width(), page.height()), (612.0, 792.0));
}

#[test]
fn test_malformed_bytes_decode_file_format_and_free_buffer() {
    let (library, trace) = hello();
    let err = library.load_document(b"not a pdf").unwrap_err();
    assert!(matches!(err, PdfError::DocumentLoad(ErrorCode::FileFormat)));
    assert!(library.stats().is_balanced());
    assert!(trace.all_released());
    assert!(!library.has_resident_document());
}

#[test]
fn test_password_error_is_decoded_for_users() {
    let (library, _trace) = start(MockPdfium::builder().document(b"locked", MockDocument::failing(4)));
    let err = library.load_document(b"locked").unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::Password));
    assert!(err.user_message().contains("password"));
}

#[test]
fn test_empty_input_is_rejected() {
    let (library, _trace) = hello();
    assert!(matches!(
        library.load_document(&[]),
        Err(PdfError::EmptyInput)
    ));
}

#[test]
fn test_allocation_failure_aborts_load() {
    let (library, _trace) = start(
        MockPdfium::builder()
            .document(HELLO_BYTES, hello_world_document())
            .heap_limit(24),
    );
    let err = library.load_document(HELLO_BYTES).unwrap_err();
    assert!(matches!(err, PdfError::Allocation { .. }));
    assert!(library.stats().is_balanced());
}

#[test]
fn test_destroy_is_idempotent() {
    let (library, trace) = hello();
    let document = library.load_document(HELLO_BYTES).unwrap();
    let page = document.get_page(2).unwrap();

    page.destroy();
    page.destroy();
    assert!(!page.is_open());
    assert_eq!(library.stats().pages_closed, 1);

    document.destroy();
    document.destroy();
    let stats = library.stats();
    assert_eq!(stats.documents_closed, 1);
    assert_eq!(stats.heap_frees, stats.heap_allocs);
    assert!(trace.all_released());

    drop(page);
    drop(document);
    assert_eq!(library.stats().pages_closed, 1);
    assert_eq!(library.stats().documents_closed, 1);
}

#[test]
fn test_destroying_document_closes_its_pages() {
    let (library, trace) = hello();
    let document = library.load_document(HELLO_BYTES).unwrap();
    let first = document.get_page(1).unwrap();
    let second = document.get_page(2).unwrap();
    assert_eq!(library.active_page_count(), 2);

    document.destroy();
    assert!(!first.is_open());
    assert!(!second.is_open());
    assert_eq!(library.active_page_count(), 0);
    assert!(trace.all_released());
    assert!(matches!(document.get_page(1), Err(PdfError::DocumentClosed)));
}

#[test]
fn test_replacing_document_tears_down_previous() {
    let (library, trace) = start(
        MockPdfium::builder()
            .document(HELLO_BYTES, hello_world_document())
            .document(b"other", MockDocument::new(vec![MockPage::blank(100.0, 100.0)])),
    );
    let first = library.load_document(HELLO_BYTES).unwrap();
    let page = first.get_page(1).unwrap();

    let second = library.load_document(b"other").unwrap();
    assert!(!first.is_open());
    assert!(second.is_open());
    assert!(matches!(page.text(), Err(PdfError::PageClosed(1))));
    assert!(matches!(first.get_page(1), Err(PdfError::DocumentClosed)));

    trace.with(|log| {
        assert_eq!(log.live_documents, 1);
        assert_eq!(log.live_pages, 0);
        assert_eq!(log.live_heap_blocks, 1);
    });

    // destroying the stale handle must not touch the new document
    first.destroy();
    assert!(second.is_open());
}

#[test]
fn test_page_numbers_are_one_based_and_checked() {
    let (library, _trace) = hello();
    let document = library.load_document(HELLO_BYTES).unwrap();
    assert!(matches!(
        document.get_page(0),
        Err(PdfError::PageOutOfRange { page: 0, count: 3 })
    ));
    assert!(matches!(
        document.get_page(4),
        Err(PdfError::PageOutOfRange { page: 4, count: 3 })
    ));
}

#[test]
fn test_native_page_failure_is_decoded() {
    let (library, _trace) = start(
        MockPdfium::builder().document(HELLO_BYTES, hello_world_document().broken_page(1)),
    );
    let document = library.load_document(HELLO_BYTES).unwrap();
    let err = document.get_page(2).unwrap_err();
    assert!(matches!(
        err,
        PdfError::PageLoad {
            page: 2,
            code: ErrorCode::PageContent
        }
    ));
    assert_eq!(library.active_page_count(), 0);
}

#[test]
fn test_teardown_releases_everything_once() {
    let (library, trace) = hello();
    let document = library.load_document(HELLO_BYTES).unwrap();
    let _page = document.get_page(1).unwrap();

    library.teardown();
    library.teardown();
    assert!(!library.is_alive());
    assert!(trace.all_released());
    trace.with(|log| assert_eq!(log.destroy_calls, 1));
    assert!(library.stats().is_balanced());

    assert!(matches!(
        library.load_document(HELLO_BYTES),
        Err(PdfError::Initialization(_))
    ));
}

#[test]
fn test_dropping_library_tears_down() {
    let (library, trace) = hello();
    let document = library.load_document(HELLO_BYTES).unwrap();
    let page = document.get_page(1).unwrap();
    drop(library);

    trace.with(|log| assert_eq!(log.destroy_calls, 1));
    assert!(trace.all_released());
    assert!(!page.is_open());
    assert!(!document.is_open());
}
