use crate::surface::{BlendMode, Paint, Surface};
use doc_model::{Color, Point, Rect};
use image::Rgba;
use pdf_engine::RgbaImage;
use std::path::Path;

/// Pixel surface backed by an RGBA buffer.
///
/// Text is drawn as solid glyph boxes on the half-em advance grid: enough to
/// show where notes and replacements land in a PNG preview.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    pixels: RgbaImage,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { pixels: RgbaImage::new(width.max(1), height.max(1)) }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    pub fn save_png(&self, path: &Path) -> Result<(), image::ImageError> {
        self.pixels.save_with_format(path, image::ImageFormat::Png)
    }

    fn blend_pixel(&mut self, x: i64, y: i64, paint: Paint) {
        if x < 0 || y < 0 || x >= i64::from(self.pixels.width()) || y >= i64::from(self.pixels.height())
        {
            return;
        }
        let alpha = paint.alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let pixel = self.pixels.get_pixel_mut(x as u32, y as u32);
        let Rgba([dr, dg, db, da]) = *pixel;
        let dst_alpha = f32::from(da) / 255.0;
        let src = [paint.color.r, paint.color.g, paint.color.b];
        let dst = [dr, dg, db];

        let mut out = [0u8; 4];
        let out_alpha = alpha + dst_alpha * (1.0 - alpha);
        for channel in 0..3 {
            let s = f32::from(src[channel]) / 255.0;
            // Transparent backdrop multiplies like white.
            let d = if dst_alpha > 0.0 { f32::from(dst[channel]) / 255.0 } else { 1.0 };
            let source = match paint.blend {
                BlendMode::SourceOver => s,
                BlendMode::Multiply => s * d,
            };
            let composed = if out_alpha > 0.0 {
                (source * alpha + d * dst_alpha * (1.0 - alpha)) / out_alpha
            } else {
                0.0
            };
            out[channel] = (composed.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
        out[3] = (out_alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        *pixel = Rgba(out);
    }

    fn fill_pixels(&mut self, rect: Rect, paint: Paint) {
        if rect.is_empty() {
            return;
        }
        let x0 = rect.x.floor() as i64;
        let y0 = rect.y.floor() as i64;
        let x1 = (rect.x + rect.width).ceil() as i64;
        let y1 = (rect.y + rect.height).ceil() as i64;
        for y in y0.max(0)..y1.min(i64::from(self.pixels.height())) {
            for x in x0.max(0)..x1.min(i64::from(self.pixels.width())) {
                self.blend_pixel(x, y, paint);
            }
        }
    }
}

/// Clips the segment `from -> to` to `bounds` (Liang-Barsky); `None` when it misses.
fn clip_segment(from: Point, to: Point, bounds: Rect) -> Option<(Point, Point)> {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let (mut enter, mut exit) = (0.0_f32, 1.0_f32);
    let edges = [
        (-dx, from.x - bounds.x),
        (dx, bounds.x + bounds.width - from.x),
        (-dy, from.y - bounds.y),
        (dy, bounds.y + bounds.height - from.y),
    ];

    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            enter = enter.max(t);
        } else {
            exit = exit.min(t);
        }
        if enter > exit {
            return None;
        }
    }

    let at = |t: f32| Point::new(from.x + dx * t, from.y + dy * t);
    Some((at(enter), at(exit)))
}

impl Surface for RasterSurface {
    fn width(&self) -> u32 {
        self.pixels.width()
    }

    fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.pixels = RgbaImage::new(width.max(1), height.max(1));
    }

    fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn fill_rect(&mut self, rect: Rect, paint: Paint) {
        self.fill_pixels(rect, paint);
    }

    fn stroke_polyline(&mut self, points: &[Point], color: Color, width: f32) {
        let radius = (width / 2.0).max(0.5);
        let paint = Paint::solid(color);
        let stamp = |surface: &mut Self, at: Point| {
            surface.fill_pixels(
                Rect::new(at.x - radius, at.y - radius, radius * 2.0, radius * 2.0),
                paint,
            );
        };

        match points {
            [] => {}
            [only] => stamp(self, *only),
            _ => {
                let reach = Rect::new(
                    -radius,
                    -radius,
                    self.pixels.width() as f32 + radius * 2.0,
                    self.pixels.height() as f32 + radius * 2.0,
                );
                for segment in points.windows(2) {
                    let Some((from, to)) = clip_segment(segment[0], segment[1], reach) else {
                        continue;
                    };
                    let length = (to.x - from.x).hypot(to.y - from.y);
                    let steps = (length * 2.0).ceil().max(1.0) as usize;
                    for step in 0..=steps {
                        let t = step as f32 / steps as f32;
                        stamp(
                            self,
                            Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t),
                        );
                    }
                }
            }
        }
    }

    fn fill_text(&mut self, text: &str, origin: Point, font_px: f32, color: Color) {
        let advance = self.measure_text("M", font_px);
        let glyph_height = font_px * 0.7;
        for (index, ch) in text.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let x = origin.x + index as f32 * advance;
            self.fill_pixels(
                Rect::new(x + advance * 0.1, origin.y - glyph_height, advance * 0.8, glyph_height),
                Paint::solid(color),
            );
        }
    }

    fn draw_image(&mut self, image: &RgbaImage) {
        let width = image.width().min(self.pixels.width());
        let height = image.height().min(self.pixels.height());
        for y in 0..height {
            for x in 0..width {
                let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
                if a == 0 {
                    continue;
                }
                self.blend_pixel(
                    i64::from(x),
                    i64::from(y),
                    Paint::translucent(Color::rgb(r, g, b), f32::from(a) / 255.0),
                );
            }
        }
    }
}
