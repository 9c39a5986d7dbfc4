//! Optical character recognition through the `tesseract` command line.

use super::types::ExtractionError;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Turns a raster image into recognized text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize the text in the image stored at `image`.
    async fn recognize(&self, image: &Path) -> Result<String, ExtractionError>;
}

/// OCR engine that shells out to `tesseract <image> stdout -l <language>`.
pub struct TesseractOcr {
    binary: String,
    language: String,
}

impl TesseractOcr {
    /// Build an engine for the given executable and language pack.
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &Path) -> Result<String, ExtractionError> {
        tracing::debug!(image = %image.display(), language = %self.language, "Running OCR");
        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.language])
            .output()
            .await
            .map_err(|source| ExtractionError::ToolUnavailable {
                tool: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ExtractionError::ToolFailed {
                tool: self.binary.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(
            image = %image.display(),
            characters = text.chars().count(),
            "OCR finished"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_reports_tool_unavailable() {
        let engine = TesseractOcr::new("docqa-test-no-such-tesseract", "eng");
        let error = engine
            .recognize(Path::new("page.png"))
            .await
            .expect_err("spawn should fail");
        assert!(matches!(
            error,
            ExtractionError::ToolUnavailable { ref tool, .. } if tool == "docqa-test-no-such-tesseract"
        ));
    }
}
