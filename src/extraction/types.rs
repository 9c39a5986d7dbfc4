//! Error type shared by the extractor and its collaborators.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while turning an uploaded file into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The filename suffix is not one of the supported formats.
    #[error("Unsupported file format: {filename}")]
    UnsupportedFormat {
        /// Filename supplied by the client.
        filename: String,
    },
    /// Reading the stored file or a temporary artifact failed.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// CSV content is not valid UTF-8.
    #[error("File {} is not valid UTF-8 text", path.display())]
    InvalidText {
        /// Offending file.
        path: PathBuf,
    },
    /// An external tool could not be started (usually not installed).
    #[error("Failed to launch '{tool}': {source}")]
    ToolUnavailable {
        /// Executable name.
        tool: String,
        /// Spawn error.
        #[source]
        source: std::io::Error,
    },
    /// An external tool exited unsuccessfully, typically on corrupt input.
    #[error("'{tool}' failed ({status}): {stderr}")]
    ToolFailed {
        /// Executable name.
        tool: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The rasterizer finished without producing any page image.
    #[error("No pages rendered from {}", path.display())]
    NoPages {
        /// PDF that produced nothing.
        path: PathBuf,
    },
}
