//! Upload classification by filename suffix.

use std::fmt;
use std::path::PathBuf;

/// Input formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Multi-page PDF, rasterized and OCR'd page by page.
    Pdf,
    /// Single raster image (`.png`, `.jpg`, `.jpeg`).
    Image,
    /// Comma-separated text, taken verbatim.
    Csv,
    /// Anything else.
    Unsupported,
}

impl DocumentFormat {
    /// Classify a filename by its suffix. Matching is case-sensitive, so `REPORT.PDF` is
    /// unsupported.
    pub fn from_filename(filename: &str) -> Self {
        if filename.ends_with(".pdf") {
            Self::Pdf
        } else if filename.ends_with(".csv") {
            Self::Csv
        } else if [".png", ".jpg", ".jpeg"]
            .iter()
            .any(|suffix| filename.ends_with(suffix))
        {
            Self::Image
        } else {
            Self::Unsupported
        }
    }

    /// Short lowercase label used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Csv => "csv",
            Self::Unsupported => "unsupported",
        }
    }

    /// Whether the extractor can produce text for this format.
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file persisted by the upload endpoint, ready for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    /// Filename as supplied by the client (basename only).
    pub filename: String,
    /// Where the bytes were written.
    pub location: PathBuf,
    /// Classification derived from `filename`.
    pub format: DocumentFormat,
}

impl UploadedDocument {
    /// Describe a stored upload, classifying it from its filename.
    pub fn new(filename: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        let filename = filename.into();
        let format = DocumentFormat::from_filename(&filename);
        Self {
            filename,
            location: location.into(),
            format,
        }
    }
}
