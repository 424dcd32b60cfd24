//! Bringing the native module up before the first library call

use std::thread;

use log::{debug, info, warn};

use super::error::PdfError;
use super::library::Library;
use super::native::PdfiumModule;
use crate::settings::{BootstrapSettings, EngineConfig};

/// Source of a native module that may take a while to become available
pub trait ModuleLoader {
    /// Whether [`ModuleLoader::instantiate`] can be called yet
    fn is_ready(&mut self) -> bool;

    fn instantiate(&mut self) -> Result<Box<dyn PdfiumModule>, PdfError>;
}

/// Polls a loader until it is ready, then initializes a [`Library`].
///
/// Nothing is cached: a failed start leaves no state behind and the next
/// call starts over.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bootstrap {
    settings: BootstrapSettings,
}

impl Bootstrap {
    #[must_use]
    pub fn new(settings: BootstrapSettings) -> Self {
        Self { settings }
    }

    /// Returns the attempt (1-based) on which the loader reported ready
    pub fn wait_until_ready(&self, loader: &mut dyn ModuleLoader) -> Result<u32, PdfError> {
        let attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=attempts {
            if loader.is_ready() {
                debug!("PDFium module ready after {attempt} attempt(s)");
                return Ok(attempt);
            }
            if attempt < attempts {
                thread::sleep(self.settings.poll_interval());
            }
        }
        warn!("PDFium module not ready after {attempts} attempts");
        Err(PdfError::Initialization(format!(
            "module not ready after {attempts} attempts"
        )))
    }

    pub fn start(
        &self,
        loader: &mut dyn ModuleLoader,
        config: EngineConfig,
    ) -> Result<Library, PdfError> {
        self.wait_until_ready(loader)?;
        let module = loader.instantiate()?;
        let library = Library::with_config(module, config)?;
        info!("PDFium bootstrap complete");
        Ok(library)
    }
}
