//! Per-variant draw routines shared by repaint and the PNG preview.

use crate::surface::{Paint, Surface};
use doc_model::{Annotation, Color, Point, Rect};

/// Opacity of the in-progress highlight rectangle.
pub const PREVIEW_ALPHA: f32 = 0.3;

/// Uncommitted gesture state drawn over the committed annotations.
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Highlight { start: Point, current: Point, color: Color },
    Stroke { points: Vec<Point>, color: Color, width: f32 },
}

pub fn draw_annotation<S: Surface + ?Sized>(surface: &mut S, annotation: &Annotation, text_font_px: f32) {
    match annotation {
        Annotation::Highlight { start, end, color, .. } => {
            surface.fill_rect(Rect::from_corners(*start, *end), Paint::solid(*color));
        }
        Annotation::Drawing { points, color, width, .. } => {
            surface.stroke_polyline(points, *color, *width);
        }
        Annotation::TextNote { position, text, color, .. } => {
            surface.fill_text(text, *position, text_font_px, *color);
        }
    }
}

pub fn draw_preview<S: Surface + ?Sized>(surface: &mut S, preview: &Preview) {
    match preview {
        Preview::Highlight { start, current, color } => {
            surface.fill_rect(Rect::from_corners(*start, *current), Paint::multiply(*color, PREVIEW_ALPHA));
        }
        Preview::Stroke { points, color, width } => {
            surface.stroke_polyline(points, *color, *width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{BlendMode, DisplayList, DrawCommand};

    fn painted_rect(annotation: &Annotation) -> Rect {
        let mut list = DisplayList::new(100, 100);
        draw_annotation(&mut list, annotation, 16.0);
        match list.commands() {
            [DrawCommand::FillRect { rect, .. }] => *rect,
            other => panic!("expected one rectangle, got {other:?}"),
        }
    }

    #[test]
    fn highlight_rect_ignores_corner_order() {
        let expected = Rect::new(10.0, 10.0, 40.0, 30.0);
        let forward = Annotation::Highlight {
            page: 1,
            start: Point::new(10.0, 10.0),
            end: Point::new(50.0, 40.0),
            color: Color::YELLOW,
        };
        let swapped = Annotation::Highlight {
            page: 1,
            start: Point::new(50.0, 40.0),
            end: Point::new(10.0, 10.0),
            color: Color::YELLOW,
        };

        assert_eq!(painted_rect(&forward), expected);
        assert_eq!(painted_rect(&swapped), expected);
    }

    #[test]
    fn text_notes_use_configured_font_size() {
        let mut list = DisplayList::new(100, 100);
        let note = Annotation::TextNote {
            page: 1,
            position: Point::new(5.0, 20.0),
            text: "Hi".to_owned(),
            color: Color::BLACK,
        };
        draw_annotation(&mut list, &note, 16.0);

        assert_eq!(
            list.commands(),
            [DrawCommand::FillText {
                text: "Hi".to_owned(),
                origin: Point::new(5.0, 20.0),
                font_px: 16.0,
                color: Color::BLACK,
            }]
        );
    }

    #[test]
    fn highlight_preview_multiplies_at_reduced_opacity() {
        let mut list = DisplayList::new(100, 100);
        draw_preview(
            &mut list,
            &Preview::Highlight {
                start: Point::new(30.0, 30.0),
                current: Point::new(10.0, 20.0),
                color: Color::YELLOW,
            },
        );

        let [DrawCommand::FillRect { rect, paint }] = list.commands() else {
            panic!("expected one rectangle");
        };
        assert_eq!(*rect, Rect::new(10.0, 20.0, 20.0, 10.0));
        assert_eq!(paint.blend, BlendMode::Multiply);
        assert_eq!(paint.alpha, PREVIEW_ALPHA);
    }
}
