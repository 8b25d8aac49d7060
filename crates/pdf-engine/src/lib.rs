//! PDF collaborators: a cancellable page rasterizer and a document writer.
//!
//! Both sit behind traits so the annotation surface can treat them as black
//! boxes; `lopdf` provides the default implementations.

mod cancel;
mod lopdf_engine;
mod text;
mod writer;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use cancel::{yield_now, CancellationToken, YieldNow};
pub use lopdf_engine::{LopdfPage, LopdfRasterizer, DEFAULT_PAGE_SIZE};
pub use text::{extract_text_items, TextItem, AVERAGE_ADVANCE_EM};
pub use writer::{DocumentWriter, LopdfWriter, PdfColor, PdfPoint, PdfRect};

use image::{ImageBuffer, Rgba};
use std::fs;
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Pixel rectangle a page is rasterized into at a given zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width_px: u32,
    pub height_px: u32,
    pub scale: f32,
}

impl Viewport {
    pub fn new(size: PageSize, scale: f32) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        Self {
            width_px: (size.width_pt * scale).round().max(1.0) as u32,
            height_px: (size.height_pt * scale).round().max(1.0) as u32,
            scale,
        }
    }
}

/// Where the document bytes come from; fetched at session start and again on export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Url(String),
}

impl OpenSource {
    /// `http://` and `https://` locations become URLs, anything else a path.
    pub fn from_location(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(location.to_owned())
        } else {
            Self::Path(PathBuf::from(location))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
            Self::Url(url) => url.clone(),
        }
    }

    /// Reads the current bytes from the source.
    pub fn fetch(&self) -> Result<Vec<u8>, PdfEngineError> {
        match self {
            Self::Path(path) => Ok(fs::read(path)?),
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Url(url) => {
                let fetch_error =
                    |reason: String| PdfEngineError::Fetch { url: url.clone(), reason };
                let response =
                    ureq::get(url).call().map_err(|err| fetch_error(err.to_string()))?;
                let mut bytes = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut bytes)
                    .map_err(|err| fetch_error(err.to_string()))?;
                Ok(bytes)
            }
        }
    }
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("render cancelled")]
    Cancelled,
    #[error("backend error: {0}")]
    Backend(String),
}

impl PdfEngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Opens pages of one document. Page numbers are 1-based.
pub trait Rasterizer {
    type Page: PageHandle;

    fn page_count(&self) -> u32;

    fn page(&self, page_number: u32) -> impl Future<Output = Result<Self::Page, PdfEngineError>>;
}

/// One decoded page.
pub trait PageHandle {
    fn page_number(&self) -> u32;

    fn size(&self) -> PageSize;

    fn viewport(&self, scale: f32) -> Viewport {
        Viewport::new(self.size(), scale)
    }

    /// Rasterizes onto a transparent background. Resolves to
    /// [`PdfEngineError::Cancelled`] once `cancel` fires.
    fn render(
        &self,
        viewport: Viewport,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<RgbaImage, PdfEngineError>>;

    fn text_content(&self) -> impl Future<Output = Result<Vec<TextItem>, PdfEngineError>>;

    /// Frees decoded resources. The handle must not be rendered afterwards.
    fn release(&mut self);

    fn is_released(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_rounds_scaled_dimensions() {
        let viewport = Viewport::new(PageSize { width_pt: 612.0, height_pt: 792.0 }, 1.5);
        assert_eq!((viewport.width_px, viewport.height_px), (918, 1188));

        let fallback = Viewport::new(PageSize { width_pt: 100.0, height_pt: 50.0 }, -2.0);
        assert_eq!((fallback.width_px, fallback.height_px, fallback.scale), (100, 50, 1.0));
    }

    #[test]
    fn locations_are_classified() {
        assert_eq!(
            OpenSource::from_location("https://example.com/a.pdf"),
            OpenSource::Url("https://example.com/a.pdf".to_owned())
        );
        assert_eq!(
            OpenSource::from_location("docs/a.pdf"),
            OpenSource::Path(PathBuf::from("docs/a.pdf"))
        );
    }

    #[test]
    fn fetch_reads_paths_and_bytes() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("doc.pdf");
        fs::write(&path, b"%PDF-1.5").expect("write should succeed");

        assert_eq!(OpenSource::from(path.as_path()).fetch().expect("read"), b"%PDF-1.5");
        assert_eq!(OpenSource::from(vec![1, 2, 3]).fetch().expect("bytes"), vec![1, 2, 3]);

        let missing = OpenSource::from(temp.path().join("missing.pdf")).fetch();
        assert!(matches!(missing, Err(PdfEngineError::Io(_))));
    }
}
