//! Whole-word search over the page's text layout, painted as a visual overlay.
//!
//! Neither mode touches annotations or history: the next repaint wipes it.

use crate::error::ViewerError;
use crate::surface::{Paint, Surface};
use doc_model::{Color, Point, Rect};
use pdf_engine::TextItem;
use regex::{Regex, RegexBuilder};

const MATCH_ALPHA: f32 = 0.3;
/// Font height assumed when an item's transform carries none.
const FALLBACK_FONT_HEIGHT: f32 = 12.0;
const RIGHT_MARGIN: f32 = 20.0;
/// Characters per wrapped line when sizing the blanked region.
const WRAP_ESTIMATE_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode<'a> {
    Highlight,
    Replace(&'a str),
}

/// Case-insensitive whole-word matcher for a literal query.
pub fn whole_word_pattern(query: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(query)))
        .case_insensitive(true)
        .build()
}

/// Items top of page first; equal baselines keep layout order.
pub fn order_items(items: &[TextItem]) -> Vec<&TextItem> {
    let mut ordered: Vec<&TextItem> = items.iter().collect();
    ordered.sort_by(|a, b| b.baseline_y().total_cmp(&a.baseline_y()));
    ordered
}

/// Paints every match of `query` and returns how many were found.
///
/// `scale` maps PDF units to surface pixels; the surface height flips the
/// baseline from PDF space into surface space.
pub fn paint_matches<S: Surface + ?Sized>(
    surface: &mut S,
    items: &[TextItem],
    query: &str,
    mode: OverlayMode<'_>,
    scale: f32,
) -> Result<usize, ViewerError> {
    if query.is_empty() {
        return Ok(0);
    }
    let pattern = whole_word_pattern(query)?;
    let mut count = 0;

    for item in order_items(items) {
        for found in pattern.find_iter(&item.text) {
            count += 1;
            let layout = MatchLayout::new(surface, item, found.start(), found.as_str(), scale);
            match mode {
                OverlayMode::Highlight => layout.highlight(surface),
                OverlayMode::Replace(replacement) => {
                    layout.replace(surface, replacement, &item.text[found.end()..])
                }
            }
        }
    }
    Ok(count)
}

struct MatchLayout {
    font_px: f32,
    line_start: f32,
    line_width: f32,
    match_x: f32,
    match_width: f32,
    baseline: f32,
}

impl MatchLayout {
    fn new<S: Surface + ?Sized>(
        surface: &S,
        item: &TextItem,
        match_start: usize,
        matched: &str,
        scale: f32,
    ) -> Self {
        let font_height = match item.font_height() {
            height if height > 0.0 => height,
            _ => FALLBACK_FONT_HEIGHT,
        };
        let font_px = font_height * scale;
        let line_start = item.x() * scale;
        let pre_width = surface.measure_text(&item.text[..match_start], font_px);
        Self {
            font_px,
            line_start,
            line_width: surface.width() as f32 - line_start - RIGHT_MARGIN,
            match_x: line_start + pre_width,
            match_width: surface.measure_text(matched, font_px),
            baseline: surface.height() as f32 - item.baseline_y() * scale,
        }
    }

    fn highlight<S: Surface + ?Sized>(&self, surface: &mut S) {
        surface.fill_rect(
            Rect::new(self.match_x, self.baseline - self.font_px, self.match_width, self.font_px),
            Paint::translucent(Color::YELLOW, MATCH_ALPHA),
        );
    }

    fn replace<S: Surface + ?Sized>(&self, surface: &mut S, replacement: &str, trailing: &str) {
        let white = Paint::solid(Color::WHITE);
        surface.fill_rect(
            Rect::new(
                self.match_x,
                self.baseline - self.font_px - 5.0,
                self.match_width,
                self.font_px + 10.0,
            ),
            white,
        );

        let estimated_lines = replacement.chars().count().div_ceil(WRAP_ESTIMATE_CHARS);
        surface.fill_rect(
            Rect::new(
                self.match_x - 2.0,
                self.baseline - self.font_px - 5.0,
                self.line_width + 4.0,
                self.font_px * estimated_lines as f32 + 10.0,
            ),
            white,
        );

        let right_edge = self.line_start + self.line_width;
        let mut line = String::new();
        let mut y = self.baseline;
        for word in replacement.split(' ') {
            let candidate = if line.is_empty() { word.to_owned() } else { format!("{line} {word}") };
            if self.match_x + surface.measure_text(&candidate, self.font_px) > right_edge {
                self.draw_run(surface, &line, self.match_x, y);
                line = word.to_owned();
                y += self.font_px * 1.2;
            } else {
                line = candidate;
            }
        }
        self.draw_run(surface, &line, self.match_x, y);

        if !trailing.is_empty() {
            let x = self.match_x + surface.measure_text(&line, self.font_px) + 5.0;
            self.draw_run(surface, trailing, x, y);
        }
    }

    fn draw_run<S: Surface + ?Sized>(&self, surface: &mut S, text: &str, x: f32, baseline: f32) {
        if text.is_empty() {
            return;
        }
        surface.fill_text(
            text,
            Point::new(x, baseline - self.font_px * 0.2),
            self.font_px,
            Color::BLACK,
        );
    }
}
