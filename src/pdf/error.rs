//! Error taxonomy for the wrapper and decoding of native error codes

use std::fmt;

use super::native::Ptr;

/// Decoded value of `FPDF_GetLastError`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    Unknown,
    FileAccess,
    FileFormat,
    Password,
    Security,
    PageContent,
    Other(u32),
}

impl ErrorCode {
    #[must_use]
    pub fn from_native(code: u32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Unknown,
            2 => Self::FileAccess,
            3 => Self::FileFormat,
            4 => Self::Password,
            5 => Self::Security,
            6 => Self::PageContent,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Unknown => 1,
            Self::FileAccess => 2,
            Self::FileFormat => 3,
            Self::Password => 4,
            Self::Security => 5,
            Self::PageContent => 6,
            Self::Other(code) => code,
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "no error",
            Self::Unknown => "unknown error",
            Self::FileAccess => "file not found or could not be opened",
            Self::FileFormat => "file not in PDF format or corrupted",
            Self::Password => "password required or incorrect password",
            Self::Security => "unsupported security scheme",
            Self::PageContent => "page not found or content error",
            Self::Other(_) => "unrecognized error code",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.description(), self.code())
    }
}

/// Why a single render call failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderFailure {
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: f64, height: f64 },
    #[error("failed to create bitmap ({width}x{height})")]
    BitmapCreate { width: i32, height: i32 },
    #[error("failed to fill bitmap background")]
    Fill,
    #[error("failed to get bitmap buffer")]
    MissingBuffer,
    #[error("unsupported bitmap format {0}")]
    UnsupportedFormat(i32),
    #[error("bitmap buffer too small: need {needed} bytes, have {actual}")]
    ShortBuffer { needed: usize, actual: usize },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PdfError {
    #[error("PDFium initialization failed: {0}")]
    Initialization(String),

    #[error("failed to allocate {size} bytes of native memory")]
    Allocation { size: usize },

    #[error("failed to load document: {0}")]
    DocumentLoad(ErrorCode),

    #[error("failed to load page {page}: {code}")]
    PageLoad { page: usize, code: ErrorCode },

    #[error("render failed: {0}")]
    Render(#[from] RenderFailure),

    #[error("text extraction failed: {0}")]
    TextExtraction(String),

    #[error("document has been closed")]
    DocumentClosed,

    #[error("page {0} has been closed")]
    PageClosed(usize),

    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    #[error("linear memory access out of bounds at {ptr} (+{len} bytes)")]
    HeapAccess { ptr: Ptr, len: usize },

    #[error("document data is empty")]
    EmptyInput,
}

impl PdfError {
    /// Message suitable for showing to a user: a generic failure line plus
    /// the decoded reason when there is one.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            PdfError::DocumentLoad(code) => {
                format!("Unable to open this PDF: {}", code.description())
            }
            PdfError::PageLoad { page, code } => {
                format!("Unable to display page {page}: {}", code.description())
            }
            PdfError::Render(failure) => format!("Unable to render page: {failure}"),
            PdfError::EmptyInput => "Unable to open this PDF: the file is empty".to_string(),
            other => format!("Something went wrong while processing the PDF: {other}"),
        }
    }

    /// Native error code carried by this error, if any
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            PdfError::DocumentLoad(code) | PdfError::PageLoad { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_codes() {
        assert_eq!(ErrorCode::from_native(0), ErrorCode::Success);
        assert_eq!(ErrorCode::from_native(3), ErrorCode::FileFormat);
        assert_eq!(ErrorCode::from_native(4), ErrorCode::Password);
        assert_eq!(ErrorCode::from_native(6), ErrorCode::PageContent);
        assert_eq!(ErrorCode::from_native(42), ErrorCode::Other(42));
    }

    #[test]
    fn code_round_trips_through_native_value() {
        for raw in 0..8 {
            assert_eq!(ErrorCode::from_native(raw).code(), raw);
        }
    }

    #[test]
    fn user_message_includes_reason() {
        let err = PdfError::DocumentLoad(ErrorCode::Password);
        assert_eq!(
            err.user_message(),
            "Unable to open this PDF: password required or incorrect password"
        );
        assert_eq!(err.code(), Some(ErrorCode::Password));
    }

    #[test]
    fn render_failure_converts() {
        let err: PdfError = RenderFailure::Fill.into();
        assert!(matches!(err, PdfError::Render(RenderFailure::Fill)));
        assert!(err.to_string().contains("fill"));
    }
}
