use std::cell::RefCell;

use super::error::ErrorCode;
use super::metrics::{Event, NativeStats, Recorder};
use super::native::PdfiumModule;

/// Owns the native module and serializes every call into it.
///
/// The module is borrowed for exactly one native call at a time, which is
/// what keeps it from being re-entered.
pub(crate) struct Runtime {
    module: RefCell<Box<dyn PdfiumModule>>,
    recorder: Recorder,
}

impl Runtime {
    pub fn new(module: Box<dyn PdfiumModule>) -> Self {
        Self {
            module: RefCell::new(module),
            recorder: Recorder::default(),
        }
    }

    pub fn call<R>(&self, f: impl FnOnce(&mut dyn PdfiumModule) -> R) -> R {
        let mut module = self.module.borrow_mut();
        f(&mut **module)
    }

    /// Like [`Runtime::call`] but gives up instead of panicking when the
    /// module is already borrowed. Used from `Drop` paths.
    pub fn try_call<R>(&self, f: impl FnOnce(&mut dyn PdfiumModule) -> R) -> Option<R> {
        let mut module = self.module.try_borrow_mut().ok()?;
        Some(f(&mut **module))
    }

    pub fn last_error(&self) -> ErrorCode {
        ErrorCode::from_native(self.call(|m| m.get_last_error()))
    }

    pub fn record(&self, event: Event) {
        self.recorder.record(event);
    }

    pub fn stats(&self) -> NativeStats {
        self.recorder.snapshot()
    }
}
