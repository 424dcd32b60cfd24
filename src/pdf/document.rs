use std::rc::Rc;

use log::{debug, info, warn};

use super::error::PdfError;
use super::library::Shared;
use super::metrics::Event;
use super::page::Page;
use super::types::PageSize;

/// A loaded PDF.
///
/// Valid while it is the library's resident document; loading another
/// document or tearing the library down closes it.
pub struct Document {
    shared: Rc<Shared>,
    id: u64,
    page_count: usize,
}

impl Document {
    pub(crate) fn new(shared: Rc<Shared>, id: u64, page_count: usize) -> Self {
        Self {
            shared,
            id,
            page_count,
        }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.document_handle(self.id).is_some()
    }

    /// Loads page `number` (1-based). Width and height are queried once here.
    pub fn get_page(&self, number: usize) -> Result<Page, PdfError> {
        let handle = self
            .shared
            .document_handle(self.id)
            .ok_or(PdfError::DocumentClosed)?;
        if number == 0 || number > self.page_count {
            return Err(PdfError::PageOutOfRange {
                page: number,
                count: self.page_count,
            });
        }
        let index = i32::try_from(number - 1).map_err(|_| PdfError::PageOutOfRange {
            page: number,
            count: self.page_count,
        })?;

        let rt = &self.shared.rt;
        let page = rt.call(|m| m.load_page(handle, index));
        if page.is_null() {
            let code = rt.last_error();
            warn!("Failed to load page {number}: {code}");
            return Err(PdfError::PageLoad { page: number, code });
        }
        rt.record(Event::PageLoad);

        let size = rt.call(|m| PageSize::new(m.get_page_width(page), m.get_page_height(page)));
        let id = self.shared.register_page(self.id, page, number);
        debug!(
            "Loaded page {number} ({page}): {}x{}",
            size.width, size.height
        );
        Ok(Page::new(Rc::clone(&self.shared), id, number, size))
    }

    /// Closes every still-active page of this document, the native
    /// document, and frees its data buffer. Safe to call repeatedly; never
    /// fails.
    pub fn destroy(&self) {
        if self.shared.release_document(Some(self.id)) {
            info!("Destroyed document #{}", self.id);
        }
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("page_count", &self.page_count)
            .field("open", &self.is_open())
            .finish()
    }
}
