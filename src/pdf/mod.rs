//! PDFium-backed rendering and text selection

mod bootstrap;
mod coords;
mod document;
mod error;
mod guard;
pub mod heap;
mod library;
mod metrics;
mod native;
mod page;
#[cfg(feature = "pdfium")]
mod pdfium_backend;
mod pixels;
mod renderer;
mod runtime;
mod selection;
mod selection_engine;
mod surface;
mod text_query;
mod types;
mod viewport;

pub use bootstrap::{Bootstrap, ModuleLoader};
pub use coords::*;
pub use document::Document;
pub use error::{ErrorCode, PdfError, RenderFailure};
pub use library::Library;
pub use metrics::NativeStats;
pub use native::{
    FILL_WHITE, INIT_WITH_CONFIG_EXPORT, LIBRARY_CONFIG_SIZE, LIBRARY_CONFIG_VERSION, NativeTrap,
    PdfiumModule, Ptr, REQUIRED_EXPORTS,
};
pub use page::Page;
#[cfg(feature = "pdfium")]
pub use pdfium_backend::{PdfiumBackend, PdfiumLoader};
pub use pixels::{BitmapFormat, to_rgba};
pub use renderer::{Command, Effect, PageRenderer, PageView, VisibilityDebouncer};
pub use selection::{
    HIGHLIGHT, SelectionBounds, SelectionRect, TextSelection, group_rects, paint_highlights,
};
pub use selection_engine::{
    CharacterSource, PageSource, PointerEvent, SelectionEngine, SelectionState,
};
pub use surface::{Canvas, DrawingSurface, TRANSPARENT, WHITE};
pub use text_query::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_CONTEXT, Occurrence, SearchHit, TextChunk,
    chunk_at, chunk_text, find_occurrences,
};
pub use types::*;
pub use viewport::{RenderMode, Viewport, ZoomState};
