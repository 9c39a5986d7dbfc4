//! Text extraction from uploaded PDFs, images, and CSV files.
//!
//! PDFs are rasterized page by page and each page goes through OCR; the page texts are joined in
//! page order with nothing in between. Images go straight to OCR. CSV files are returned verbatim.
//! Both OCR and rasterization run as child processes so the runtime keeps serving other requests
//! while they work.

mod format;
mod ocr;
mod rasterize;
mod types;

pub use format::{DocumentFormat, UploadedDocument};
pub use ocr::{OcrEngine, TesseractOcr};
pub use rasterize::{PdfRasterizer, PdftoppmRasterizer, RasterizedPages};
pub use types::ExtractionError;

use crate::config::Config;
use std::path::Path;
use std::sync::Arc;

/// Produces a single text string from a stored upload.
pub struct TextExtractor {
    ocr: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PdfRasterizer>,
}

impl TextExtractor {
    /// Build an extractor from explicit collaborators.
    pub fn new(ocr: Arc<dyn OcrEngine>, rasterizer: Arc<dyn PdfRasterizer>) -> Self {
        Self { ocr, rasterizer }
    }

    /// Build an extractor backed by `tesseract` and `pdftoppm` as configured.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(TesseractOcr::new(
                config.tesseract_bin.clone(),
                config.ocr_language.clone(),
            )),
            Arc::new(PdftoppmRasterizer::new(
                config.pdftoppm_bin.clone(),
                config.pdf_render_dpi,
            )),
        )
    }

    /// Extract the text of a stored upload.
    pub async fn extract_document(
        &self,
        document: &UploadedDocument,
    ) -> Result<String, ExtractionError> {
        if !document.format.is_supported() {
            return Err(ExtractionError::UnsupportedFormat {
                filename: document.filename.clone(),
            });
        }
        self.extract(&document.location, document.format).await
    }

    /// Extract text from `location`, interpreting it as `format`.
    pub async fn extract(
        &self,
        location: &Path,
        format: DocumentFormat,
    ) -> Result<String, ExtractionError> {
        tracing::debug!(path = %location.display(), %format, "Extracting text");
        let text = match format {
            DocumentFormat::Csv => read_verbatim(location).await?,
            DocumentFormat::Image => {
                ensure_readable(location).await?;
                self.ocr.recognize(location).await?
            }
            DocumentFormat::Pdf => {
                ensure_readable(location).await?;
                let pages = self.rasterizer.rasterize(location).await?;
                let mut text = String::new();
                for page in pages.pages() {
                    text.push_str(&self.ocr.recognize(page).await?);
                }
                text
            }
            DocumentFormat::Unsupported => {
                return Err(ExtractionError::UnsupportedFormat {
                    filename: location
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                });
            }
        };
        tracing::info!(
            path = %location.display(),
            %format,
            characters = text.chars().count(),
            "Text extracted"
        );
        Ok(text)
    }
}

async fn read_verbatim(location: &Path) -> Result<String, ExtractionError> {
    let bytes = tokio::fs::read(location)
        .await
        .map_err(|source| ExtractionError::Io {
            path: location.to_path_buf(),
            source,
        })?;
    String::from_utf8(bytes).map_err(|_| ExtractionError::InvalidText {
        path: location.to_path_buf(),
    })
}

async fn ensure_readable(location: &Path) -> Result<(), ExtractionError> {
    tokio::fs::metadata(location)
        .await
        .map(|_| ())
        .map_err(|source| ExtractionError::Io {
            path: location.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Returns canned text keyed by file name and records call order.
    struct ScriptedOcr {
        texts: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedOcr {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                texts: pairs
                    .iter()
                    .map(|(name, text)| (name.to_string(), text.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl OcrEngine for ScriptedOcr {
        async fn recognize(&self, image: &Path) -> Result<String, ExtractionError> {
            let name = image
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned();
            self.calls.lock().unwrap().push(name.clone());
            self.texts
                .get(&name)
                .cloned()
                .ok_or_else(|| ExtractionError::ToolFailed {
                    tool: "scripted".into(),
                    status: "exit status: 1".into(),
                    stderr: format!("no text for {name}"),
                })
        }
    }

    struct FixedPages(Vec<&'static str>);

    #[async_trait::async_trait]
    impl PdfRasterizer for FixedPages {
        async fn rasterize(&self, _pdf: &Path) -> Result<RasterizedPages, ExtractionError> {
            let dir = tempfile::tempdir().unwrap();
            let pages = self.0.iter().map(|name| dir.path().join(name)).collect();
            Ok(RasterizedPages::new(dir, pages))
        }
    }

    fn write_temp(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn extractor(ocr: ScriptedOcr, pages: Vec<&'static str>) -> (TextExtractor, Arc<ScriptedOcr>) {
        let ocr = Arc::new(ocr);
        let extractor = TextExtractor::new(ocr.clone(), Arc::new(FixedPages(pages)));
        (extractor, ocr)
    }

    #[tokio::test]
    async fn csv_is_returned_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "data.csv", b"hello,world");
        let (extractor, _) = extractor(ScriptedOcr::new(&[]), vec![]);

        let text = extractor.extract(&path, DocumentFormat::Csv).await.unwrap();
        assert_eq!(text, "hello,world");
    }

    #[tokio::test]
    async fn csv_with_invalid_utf8_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "data.csv", &[0xff, 0xfe, 0x00]);
        let (extractor, _) = extractor(ScriptedOcr::new(&[]), vec![]);

        let error = extractor
            .extract(&path, DocumentFormat::Csv)
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractionError::InvalidText { .. }));
    }

    #[tokio::test]
    async fn image_goes_through_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "scan.png", b"not really a png");
        let (extractor, ocr) = extractor(ScriptedOcr::new(&[("scan.png", "Receipt\n")]), vec![]);

        let text = extractor.extract(&path, DocumentFormat::Image).await.unwrap();
        assert_eq!(text, "Receipt\n");
        assert_eq!(*ocr.calls.lock().unwrap(), vec!["scan.png".to_string()]);
    }

    #[tokio::test]
    async fn blank_image_yields_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "blank.png", b"\x89PNG");
        let (extractor, _) = extractor(ScriptedOcr::new(&[("blank.png", "")]), vec![]);

        let text = extractor.extract(&path, DocumentFormat::Image).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn pdf_pages_are_concatenated_in_order_without_separator() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "doc.pdf", b"%PDF-1.4");
        let (extractor, ocr) = extractor(
            ScriptedOcr::new(&[("page-1.png", "Invoice "), ("page-2.png", "Total: 42")]),
            vec!["page-1.png", "page-2.png"],
        );

        let text = extractor.extract(&path, DocumentFormat::Pdf).await.unwrap();
        assert_eq!(text, "Invoice Total: 42");
        assert_eq!(
            *ocr.calls.lock().unwrap(),
            vec!["page-1.png".to_string(), "page-2.png".to_string()]
        );
    }

    #[tokio::test]
    async fn ocr_failure_on_any_page_fails_the_whole_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "doc.pdf", b"%PDF-1.4");
        let (extractor, _) = extractor(
            ScriptedOcr::new(&[("page-1.png", "first page")]),
            vec!["page-1.png", "page-2.png"],
        );

        let error = extractor
            .extract(&path, DocumentFormat::Pdf)
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractionError::ToolFailed { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let (extractor, _) = extractor(ScriptedOcr::new(&[]), vec![]);
        for format in [DocumentFormat::Csv, DocumentFormat::Image, DocumentFormat::Pdf] {
            let error = extractor
                .extract(Path::new("/definitely/not/here.bin"), format)
                .await
                .unwrap_err();
            assert!(matches!(error, ExtractionError::Io { .. }), "{format}");
        }
    }

    #[tokio::test]
    async fn unsupported_document_is_rejected_before_reading() {
        let (extractor, _) = extractor(ScriptedOcr::new(&[]), vec![]);
        let document = UploadedDocument::new("notes.txt", "/definitely/not/here.txt");

        let error = extractor.extract_document(&document).await.unwrap_err();
        assert!(
            matches!(error, ExtractionError::UnsupportedFormat { ref filename } if filename == "notes.txt")
        );
    }
}
