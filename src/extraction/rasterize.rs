//! PDF page rasterization through poppler's `pdftoppm`.

use super::types::ExtractionError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;

/// Page images produced for one PDF, ordered by page number.
///
/// The images live in a temporary directory that is removed when this value is dropped.
pub struct RasterizedPages {
    _dir: TempDir,
    pages: Vec<PathBuf>,
}

impl RasterizedPages {
    /// Wrap page images stored under `dir`; `pages` must already be in page order.
    pub fn new(dir: TempDir, pages: Vec<PathBuf>) -> Self {
        Self { _dir: dir, pages }
    }

    /// Page image paths in page order.
    pub fn pages(&self) -> &[PathBuf] {
        &self.pages
    }
}

/// Renders every page of a PDF to an image.
#[async_trait]
pub trait PdfRasterizer: Send + Sync {
    /// Rasterize `pdf`, returning one image per page.
    async fn rasterize(&self, pdf: &Path) -> Result<RasterizedPages, ExtractionError>;
}

/// Rasterizer that runs `pdftoppm -png -r <dpi> <pdf> <tmp>/page`.
pub struct PdftoppmRasterizer {
    binary: String,
    dpi: u32,
}

impl PdftoppmRasterizer {
    /// Build a rasterizer for the given executable and resolution.
    pub fn new(binary: impl Into<String>, dpi: u32) -> Self {
        Self {
            binary: binary.into(),
            dpi,
        }
    }
}

#[async_trait]
impl PdfRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf: &Path) -> Result<RasterizedPages, ExtractionError> {
        let dir = tempfile::Builder::new()
            .prefix("docqa-pages-")
            .tempdir()
            .map_err(|source| ExtractionError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        let prefix = dir.path().join("page");

        let output = Command::new(&self.binary)
            .arg("-png")
            .args(["-r", &self.dpi.to_string()])
            .arg(pdf)
            .arg(&prefix)
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

        let mut entries = tokio::fs::read_dir(dir.path())
            .await
            .map_err(|source| ExtractionError::Io {
                path: dir.path().to_path_buf(),
                source,
            })?;
        let mut pages = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| ExtractionError::Io {
                path: dir.path().to_path_buf(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                pages.push(path);
            }
        }

        if pages.is_empty() {
            return Err(ExtractionError::NoPages {
                path: pdf.to_path_buf(),
            });
        }

        sort_pages(&mut pages);
        tracing::debug!(pdf = %pdf.display(), pages = pages.len(), dpi = self.dpi, "PDF rasterized");
        Ok(RasterizedPages::new(dir, pages))
    }
}

/// Order `page-<n>.png` files numerically; padding width varies with the page count.
fn sort_pages(pages: &mut [PathBuf]) {
    pages.sort_by(|a, b| {
        page_number(a)
            .cmp(&page_number(b))
            .then_with(|| a.cmp(b))
    });
}

fn page_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let (_, digits) = stem.rsplit_once('-')?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_sort_numerically() {
        let mut pages = vec![
            PathBuf::from("/tmp/x/page-10.png"),
            PathBuf::from("/tmp/x/page-2.png"),
            PathBuf::from("/tmp/x/page-1.png"),
        ];
        sort_pages(&mut pages);
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page-1.png", "page-2.png", "page-10.png"]);
    }

    #[test]
    fn page_number_parses_zero_padded_suffix() {
        assert_eq!(page_number(Path::new("page-007.png")), Some(7));
        assert_eq!(page_number(Path::new("cover.png")), None);
    }

    #[tokio::test]
    async fn missing_binary_reports_tool_unavailable() {
        let rasterizer = PdftoppmRasterizer::new("docqa-test-no-such-pdftoppm", 200);
        let error = rasterizer
            .rasterize(Path::new("doc.pdf"))
            .await
            .err()
            .expect("spawn should fail");
        assert!(matches!(error, ExtractionError::ToolUnavailable { .. }));
    }
}
