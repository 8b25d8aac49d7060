//! Drawing surfaces
//!
//! Everything that paints (the render coordinator, the incremental stroke in
//! the interaction controller, the search overlay) goes through [`Surface`].

use doc_model::{Color, Point, Rect};
use pdf_engine::{RgbaImage, AVERAGE_ADVANCE_EM};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    SourceOver,
    Multiply,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    pub color: Color,
    pub alpha: f32,
    pub blend: BlendMode,
}

impl Paint {
    pub const fn solid(color: Color) -> Self {
        Self { color, alpha: 1.0, blend: BlendMode::SourceOver }
    }

    pub const fn translucent(color: Color, alpha: f32) -> Self {
        Self { color, alpha, blend: BlendMode::SourceOver }
    }

    pub const fn multiply(color: Color, alpha: f32) -> Self {
        Self { color, alpha, blend: BlendMode::Multiply }
    }
}

/// Width of `text` at `font_px`, using the same half-em advance the text
/// extractor assumes so measured overlays line up with extracted layout.
pub fn approximate_text_width(text: &str, font_px: f32) -> f32 {
    text.chars().count() as f32 * AVERAGE_ADVANCE_EM * font_px
}

pub trait Surface {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Resizing discards the current contents.
    fn resize(&mut self, width: u32, height: u32);

    /// Resets every pixel to transparent.
    fn clear(&mut self);

    fn fill_rect(&mut self, rect: Rect, paint: Paint);

    /// Connected stroke through `points` in order.
    fn stroke_polyline(&mut self, points: &[Point], color: Color, width: f32);

    /// Fills `text` with its baseline starting at `origin`.
    fn fill_text(&mut self, text: &str, origin: Point, font_px: f32, color: Color);

    /// Composites a page raster at the origin, honoring its alpha.
    fn draw_image(&mut self, image: &RgbaImage);

    fn measure_text(&self, text: &str, font_px: f32) -> f32 {
        approximate_text_width(text, font_px)
    }

    fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width() as f32, self.height() as f32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect { rect: Rect, paint: Paint },
    StrokePolyline { points: Vec<Point>, color: Color, width: f32 },
    FillText { text: String, origin: Point, font_px: f32, color: Color },
    DrawImage { width: u32, height: u32 },
}

/// Surface that records what was drawn since the last clear.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
    clears: usize,
}

impl DisplayList {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, commands: Vec::new(), clears: 0 }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of times the surface has been cleared (one per full repaint).
    pub fn clear_count(&self) -> usize {
        self.clears
    }

    pub fn text_runs(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DrawCommand::FillText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Surface for DisplayList {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.commands.clear();
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.clears += 1;
    }

    fn fill_rect(&mut self, rect: Rect, paint: Paint) {
        self.commands.push(DrawCommand::FillRect { rect, paint });
    }

    fn stroke_polyline(&mut self, points: &[Point], color: Color, width: f32) {
        self.commands.push(DrawCommand::StrokePolyline { points: points.to_vec(), color, width });
    }

    fn fill_text(&mut self, text: &str, origin: Point, font_px: f32, color: Color) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_owned(),
            origin,
            font_px,
            color,
        });
    }

    fn draw_image(&mut self, image: &RgbaImage) {
        self.commands.push(DrawCommand::DrawImage { width: image.width(), height: image.height() });
    }
}
