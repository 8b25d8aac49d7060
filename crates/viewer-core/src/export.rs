//! Bakes committed annotations into a fresh copy of the document.

use crate::error::ViewerError;
use doc_model::{Annotation, AnnotationSet, Color, Point, Rect};
use pdf_engine::{DocumentWriter, PageSize, PdfColor, PdfEngineError, PdfPoint, PdfRect};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Surface pixels (top-left origin, Y down) to PDF user space (bottom-left origin, Y up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub page_height: f32,
}

impl CoordinateTransform {
    pub fn new(page: PageSize, canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            scale_x: page.width_pt / canvas_width.max(1) as f32,
            scale_y: page.height_pt / canvas_height.max(1) as f32,
            page_height: page.height_pt,
        }
    }

    pub fn apply(&self, point: Point) -> PdfPoint {
        PdfPoint::new(point.x * self.scale_x, self.page_height - point.y * self.scale_y)
    }

    pub fn rect(&self, a: Point, b: Point) -> PdfRect {
        let (a, b) = (self.apply(a), self.apply(b));
        PdfRect {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub page: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub text_font_px: f32,
    pub highlight_opacity: f32,
}

fn pdf_color(color: Color) -> PdfColor {
    let (r, g, b) = color.to_normalized();
    PdfColor::new(r, g, b)
}

/// Draws the annotations on `settings.page` in order; other pages are skipped.
/// Returns how many annotations were written.
pub fn replay_page<W: DocumentWriter>(
    writer: &mut W,
    annotations: &AnnotationSet,
    settings: &ExportSettings,
) -> Result<usize, PdfEngineError> {
    if settings.canvas_width == 0 || settings.canvas_height == 0 {
        return Err(PdfEngineError::Backend("canvas has no area to map from".to_owned()));
    }
    let transform = CoordinateTransform::new(
        writer.page_size(settings.page)?,
        settings.canvas_width,
        settings.canvas_height,
    );

    let mut written = 0;
    for annotation in annotations.on_page(settings.page) {
        match annotation {
            Annotation::Highlight { start, end, color, .. } => {
                let bounds = Rect::from_corners(*start, *end);
                writer.draw_rectangle(
                    settings.page,
                    transform.rect(bounds.min(), bounds.max()),
                    pdf_color(*color),
                    settings.highlight_opacity,
                )?;
            }
            Annotation::Drawing { points, color, width, .. } => {
                for segment in points.windows(2) {
                    writer.draw_line(
                        settings.page,
                        transform.apply(segment[0]),
                        transform.apply(segment[1]),
                        width * transform.scale_x,
                        pdf_color(*color),
                    )?;
                }
            }
            Annotation::TextNote { position, text, color, .. } => {
                writer.draw_text(
                    settings.page,
                    text,
                    transform.apply(*position),
                    settings.text_font_px * transform.scale_x,
                    pdf_color(*color),
                )?;
            }
        }
        written += 1;
    }
    Ok(written)
}

/// Loads `source_bytes`, replays the page's annotations and serializes the result.
pub fn export_page<W: DocumentWriter>(
    source_bytes: &[u8],
    annotations: &AnnotationSet,
    settings: &ExportSettings,
) -> Result<Vec<u8>, ViewerError> {
    let mut writer = W::load(source_bytes).map_err(ViewerError::Export)?;
    let written = replay_page(&mut writer, annotations, settings).map_err(ViewerError::Export)?;
    let bytes = writer.save().map_err(ViewerError::Export)?;
    debug!(page = settings.page, annotations = written, bytes = bytes.len(), "exported page");
    Ok(bytes)
}

/// Serialized output ready to be handed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportedDocument {
    pub fn save_to_dir(&self, dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}
