use folio::EngineConfig;
use folio::pdf::{Bootstrap, ModuleLoader, PdfError, PdfiumModule};
use folio::settings::BootstrapSettings;
use folio::test_utils::test_helpers::{HELLO_BYTES, MockPdfium, MockTrace, hello_world_document};

/// Becomes ready after a number of polls and hands out mock modules
struct SlowLoader {
    polls_until_ready: u32,
    polls: u32,
    instantiated: u32,
    traces: Vec<MockTrace>,
}

impl SlowLoader {
    fn new(polls_until_ready: u32) -> Self {
        Self {
            polls_until_ready,
            polls: 0,
            instantiated: 0,
            traces: Vec::new(),
        }
    }
}

impl ModuleLoader for SlowLoader {
    fn is_ready(&mut self) -> bool {
        self.polls += 1;
        self.polls >= self.polls_until_ready
    }

    fn instantiate(&mut self) -> Result<Box<dyn PdfiumModule>, PdfError> {
        self.instantiated += 1;
        let (mock, trace) = MockPdfium::builder()
            .document(HELLO_BYTES, hello_world_document())
            .build();
        self.traces.push(trace);
        Ok(Box::new(mock))
    }
}

fn bootstrap(max_attempts: u32) -> Bootstrap {
    Bootstrap::new(BootstrapSettings {
        max_attempts,
        poll_interval_ms: 0,
    })
}

#[test]
fn test_start_initializes_library_with_config() {
    let mut loader = SlowLoader::new(2);
    let mut config = EngineConfig::default();
    config.text.hit_tolerance = 1.5;

    let library = bootstrap(5).start(&mut loader, config).unwrap();
    assert!(library.is_alive());
    assert_eq!(library.config().text.hit_tolerance, 1.5);
    assert_eq!(loader.polls, 2);
    assert_eq!(loader.instantiated, 1);

    let document = library.load_document(HELLO_BYTES).unwrap();
    assert_eq!(document.page_count(), 3);
    loader.traces[0].with(|log| assert_eq!(log.config_init_calls, 1));
}

#[test]
fn test_failed_start_can_be_retried() {
    let mut loader = SlowLoader::new(4);

    let err = bootstrap(2)
        .start(&mut loader, EngineConfig::default())
        .unwrap_err();
    assert!(matches!(err, PdfError::Initialization(_)));
    assert_eq!(loader.instantiated, 0);

    let library = bootstrap(2)
        .start(&mut loader, EngineConfig::default())
        .unwrap();
    assert!(library.is_alive());
    assert_eq!(loader.polls, 4);
    assert_eq!(loader.instantiated, 1);
}

#[test]
fn test_broken_module_fails_start() {
    struct BrokenLoader;

    impl ModuleLoader for BrokenLoader {
        fn is_ready(&mut self) -> bool {
            true
        }

        fn instantiate(&mut self) -> Result<Box<dyn PdfiumModule>, PdfError> {
            let (mock, _trace) = MockPdfium::builder().without_export("FPDF_RenderPageBitmap").build();
            Ok(Box::new(mock))
        }
    }

    let err = bootstrap(1)
        .start(&mut BrokenLoader, EngineConfig::default())
        .unwrap_err();
    assert!(err.to_string().contains("FPDF_RenderPageBitmap"));
}
