pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use pdf::{Document, Library, Page, PdfError};
pub use settings::EngineConfig;
