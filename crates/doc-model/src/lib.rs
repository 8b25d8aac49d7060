//! Annotation data model and snapshot history.

mod annotation;
mod color;
mod geometry;
mod history;

pub use annotation::{Annotation, AnnotationKind, AnnotationSet};
pub use color::{Color, ColorParseError};
pub use geometry::{Point, Rect};
pub use history::{History, HistoryAction};

use serde::{Deserialize, Serialize};

pub const DEFAULT_EXPORT_FILE_NAME: &str = "annotated-document.pdf";

/// Tunables for an annotation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Viewport zoom applied to page dimensions.
    pub scale: f32,
    /// Opaque base layer painted beneath the page render.
    pub background_color: Color,
    pub annotation_color: Color,
    pub stroke_width: f32,
    pub text_font_px: f32,
    pub highlight_export_opacity: f32,
    pub export_file_name: String,
    /// Presentation only.
    pub dark_theme: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            scale: 1.5,
            background_color: Color::WHITE,
            annotation_color: Color::YELLOW,
            stroke_width: 2.0,
            text_font_px: 16.0,
            highlight_export_opacity: 0.35,
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_owned(),
            dark_theme: false,
        }
    }
}

impl Preferences {
    /// Clamps values a hand-edited file could make unusable.
    pub fn sanitized(mut self) -> Self {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            self.scale = 1.5;
        }
        self.scale = self.scale.clamp(0.1, 16.0);
        if !(self.stroke_width.is_finite() && self.stroke_width > 0.0) {
            self.stroke_width = 2.0;
        }
        if !(self.text_font_px.is_finite() && self.text_font_px > 0.0) {
            self.text_font_px = 16.0;
        }
        self.highlight_export_opacity = if self.highlight_export_opacity.is_finite() {
            self.highlight_export_opacity.clamp(0.0, 1.0)
        } else {
            0.35
        };
        if self.export_file_name.trim().is_empty() {
            self.export_file_name = DEFAULT_EXPORT_FILE_NAME.to_owned();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_preferences_fill_in_defaults() {
        let prefs: Preferences =
            serde_json::from_str(r##"{"scale": 2.0, "annotation_color": "#00ff00"}"##)
                .expect("partial preferences should parse");

        assert_eq!(prefs.scale, 2.0);
        assert_eq!(prefs.annotation_color, Color::rgb(0, 255, 0));
        assert_eq!(prefs.export_file_name, "annotated-document.pdf");
        assert_eq!(prefs.stroke_width, 2.0);
    }

    #[test]
    fn sanitized_repairs_out_of_range_values() {
        let prefs = Preferences {
            scale: -1.0,
            stroke_width: 0.0,
            highlight_export_opacity: 4.0,
            export_file_name: "  ".to_owned(),
            ..Preferences::default()
        }
        .sanitized();

        assert_eq!(prefs.scale, 1.5);
        assert_eq!(prefs.stroke_width, 2.0);
        assert_eq!(prefs.highlight_export_opacity, 1.0);
        assert_eq!(prefs.export_file_name, DEFAULT_EXPORT_FILE_NAME);
    }
}
