//! Library lifecycle and the registry of live native handles

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, error, info, warn};

use super::document::Document;
use super::error::PdfError;
use super::guard::HeapBuffer;
use super::metrics::{Event, NativeStats};
use super::native::{
    INIT_WITH_CONFIG_EXPORT, LIBRARY_CONFIG_SIZE, LIBRARY_CONFIG_VERSION, PdfiumModule, Ptr,
    REQUIRED_EXPORTS,
};
use super::runtime::Runtime;
use crate::settings::EngineConfig;

/// Library-issued identity of a loaded page. Native handle values can be
/// recycled after close; these ids never are.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PageId(u64);

struct ResidentDocument {
    id: u64,
    handle: Ptr,
    data: Ptr,
    data_len: usize,
}

struct ActivePage {
    handle: Ptr,
    document: u64,
    number: usize,
}

#[derive(Default)]
struct Registry {
    alive: bool,
    resident: Option<ResidentDocument>,
    pages: HashMap<PageId, ActivePage>,
    next_id: u64,
}

/// State shared by the library and every document and page it hands out
pub(crate) struct Shared {
    pub rt: Runtime,
    pub config: EngineConfig,
    registry: RefCell<Registry>,
}

impl Shared {
    fn next_id(&self) -> u64 {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        registry.next_id
    }

    pub fn is_alive(&self) -> bool {
        self.registry.borrow().alive
    }

    /// Native handle of the document, while it is still the resident one
    pub fn document_handle(&self, id: u64) -> Option<Ptr> {
        let registry = self.registry.borrow();
        registry
            .resident
            .as_ref()
            .filter(|doc| doc.id == id)
            .map(|doc| doc.handle)
    }

    pub fn register_page(&self, document: u64, handle: Ptr, number: usize) -> PageId {
        let id = PageId(self.next_id());
        self.registry.borrow_mut().pages.insert(
            id,
            ActivePage {
                handle,
                document,
                number,
            },
        );
        id
    }

    pub fn page_handle(&self, id: PageId) -> Option<Ptr> {
        self.registry.borrow().pages.get(&id).map(|page| page.handle)
    }

    /// Closes an active page. Returns false when it was already closed.
    pub fn close_page(&self, id: PageId) -> bool {
        let removed = self.registry.borrow_mut().pages.remove(&id);
        match removed {
            Some(page) => {
                self.close_native_page(&page);
                true
            }
            None => false,
        }
    }

    fn close_native_page(&self, page: &ActivePage) {
        let handle = page.handle;
        match self.rt.try_call(|m| m.close_page(handle)) {
            Some(()) => {
                self.rt.record(Event::PageClose);
                debug!("Closed page {} ({handle})", page.number);
            }
            None => error!("Error destroying page {}: module busy", page.number),
        }
    }

    /// Full teardown of the resident document: its active pages, the native
    /// document, then the data buffer. With `only`, nothing happens unless
    /// that document is the resident one. Returns whether anything was
    /// released.
    pub fn release_document(&self, only: Option<u64>) -> bool {
        let (resident, pages) = {
            let mut registry = self.registry.borrow_mut();
            let matches = registry
                .resident
                .as_ref()
                .is_some_and(|doc| only.is_none_or(|id| id == doc.id));
            if !matches {
                return false;
            }
            let Some(resident) = registry.resident.take() else {
                return false;
            };
            let ids: Vec<PageId> = registry
                .pages
                .iter()
                .filter(|(_, page)| page.document == resident.id)
                .map(|(id, _)| *id)
                .collect();
            let pages: Vec<ActivePage> = ids
                .iter()
                .filter_map(|id| registry.pages.remove(id))
                .collect();
            (resident, pages)
        };

        for page in &pages {
            self.close_native_page(page);
        }

        let handle = resident.handle;
        match self.rt.try_call(|m| m.close_document(handle)) {
            Some(()) => self.rt.record(Event::DocumentClose),
            None => error!("Error closing document {handle}: module busy"),
        }
        drop(HeapBuffer::adopt(&self.rt, resident.data, resident.data_len));

        debug!(
            "Released document #{} ({} open pages closed)",
            resident.id,
            pages.len()
        );
        true
    }

    fn teardown(&self) {
        if !self.is_alive() {
            return;
        }
        self.release_document(None);

        let orphans: Vec<ActivePage> = self
            .registry
            .borrow_mut()
            .pages
            .drain()
            .map(|(_, page)| page)
            .collect();
        for page in &orphans {
            warn!("Closing orphaned page {} during teardown", page.number);
            self.close_native_page(page);
        }

        self.registry.borrow_mut().alive = false;
        if self.rt.try_call(|m| m.destroy_library()).is_none() {
            error!("Failed to destroy PDFium library: module busy");
        }
        info!("PDFium library torn down");
    }
}

/// An initialized native library.
///
/// Owns the module for its whole life; documents and pages obtained from it
/// stay usable only while it is alive. Dropping the library tears it down.
pub struct Library {
    shared: Rc<Shared>,
}

impl Library {
    /// Initializes the module with default engine settings
    pub fn initialize(module: Box<dyn PdfiumModule>) -> Result<Self, PdfError> {
        Self::with_config(module, EngineConfig::default())
    }

    pub fn with_config(
        module: Box<dyn PdfiumModule>,
        config: EngineConfig,
    ) -> Result<Self, PdfError> {
        let rt = Runtime::new(module);
        initialize_native(&rt)?;
        info!("PDFium library initialized");

        Ok(Self {
            shared: Rc::new(Shared {
                rt,
                config,
                registry: RefCell::new(Registry {
                    alive: true,
                    ..Registry::default()
                }),
            }),
        })
    }

    /// Loads a PDF from memory, replacing any resident document.
    ///
    /// The previous document is fully torn down first, so at most one data
    /// buffer is resident at a time.
    pub fn load_document(&self, bytes: &[u8]) -> Result<Document, PdfError> {
        if !self.shared.is_alive() {
            return Err(PdfError::Initialization(
                "library has been torn down".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(PdfError::EmptyInput);
        }
        if self.shared.release_document(None) {
            debug!("Replaced previously resident document");
        }

        let rt = &self.shared.rt;
        let buffer = HeapBuffer::alloc(rt, bytes.len())?;
        buffer.write(bytes)?;

        let handle = rt.call(|m| m.load_mem_document(buffer.ptr(), bytes.len(), Ptr::NULL));
        if handle.is_null() {
            let code = rt.last_error();
            warn!("Failed to load document ({} bytes): {code}", bytes.len());
            return Err(PdfError::DocumentLoad(code));
        }
        rt.record(Event::DocumentLoad);

        let page_count = usize::try_from(rt.call(|m| m.get_page_count(handle))).unwrap_or(0);
        let id = self.shared.next_id();
        let data_len = bytes.len();
        let data = buffer.into_raw();
        self.shared.registry.borrow_mut().resident = Some(ResidentDocument {
            id,
            handle,
            data,
            data_len,
        });

        info!("Loaded document #{id}: {data_len} bytes, {page_count} pages");
        Ok(Document::new(Rc::clone(&self.shared), id, page_count))
    }

    /// Allocation audit counters
    #[must_use]
    pub fn stats(&self) -> NativeStats {
        self.shared.rt.stats()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    #[must_use]
    pub fn active_page_count(&self) -> usize {
        self.shared.registry.borrow().pages.len()
    }

    #[must_use]
    pub fn has_resident_document(&self) -> bool {
        self.shared.registry.borrow().resident.is_some()
    }

    /// Best-effort release of every native resource, then the library
    /// itself. Idempotent; later loads fail.
    pub fn teardown(&self) {
        self.shared.teardown();
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("alive", &self.is_alive())
            .field("resident", &self.has_resident_document())
            .field("active_pages", &self.active_page_count())
            .finish()
    }
}

fn initialize_native(rt: &Runtime) -> Result<(), PdfError> {
    let missing: Vec<&str> = REQUIRED_EXPORTS
        .iter()
        .copied()
        .filter(|name| !rt.call(|m| m.has_export(name)))
        .collect();
    if !missing.is_empty() {
        return Err(PdfError::Initialization(format!(
            "invalid PDFium module, missing exports: {}",
            missing.join(", ")
        )));
    }

    match init_with_config(rt) {
        Ok(()) => {
            debug!("Initialized PDFium with config v{LIBRARY_CONFIG_VERSION}");
            Ok(())
        }
        Err(e) => {
            warn!("Configured initialization failed ({e}), attempting fallback initialization");
            rt.call(|m| m.init_library()).map_err(|trap| {
                error!("Fallback initialization failed: {trap}");
                PdfError::Initialization(trap.to_string())
            })
        }
    }
}

fn init_with_config(rt: &Runtime) -> Result<(), PdfError> {
    if !rt.call(|m| m.has_export(INIT_WITH_CONFIG_EXPORT)) {
        return Err(PdfError::Initialization(format!(
            "{INIT_WITH_CONFIG_EXPORT} not exported"
        )));
    }
    let config = HeapBuffer::alloc(rt, LIBRARY_CONFIG_SIZE)?;
    let mut block = [0u8; LIBRARY_CONFIG_SIZE];
    block[..4].copy_from_slice(&LIBRARY_CONFIG_VERSION.to_le_bytes());
    config.write(&block)?;

    rt.call(|m| m.init_library_with_config(config.ptr()))
        .map_err(|trap| PdfError::Initialization(trap.to_string()))
}
