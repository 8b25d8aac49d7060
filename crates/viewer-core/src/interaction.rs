//! Pointer gestures to annotation commits.
//!
//! The controller never touches history or the surface itself: every event
//! returns an [`Effect`] for the session to apply.

use crate::paint::Preview;
use doc_model::{Annotation, Color, Point};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    /// Reserved; pointer events are ignored.
    Select,
    #[default]
    Highlight,
    Draw,
    Text,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Highlight => "highlight",
            Self::Draw => "draw",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool '{0}' (expected select, highlight, draw or text)")]
pub struct UnknownTool(pub String);

impl FromStr for Tool {
    type Err = UnknownTool;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(Self::Select),
            "highlight" => Ok(Self::Highlight),
            "draw" => Ok(Self::Draw),
            "text" => Ok(Self::Text),
            _ => Err(UnknownTool(value.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Highlighting { start: Point, current: Point },
    Drawing { points: Vec<Point> },
    AwaitingText { position: Point },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    /// Full redraw including the current preview.
    Repaint,
    /// Paint one stroke segment directly, without a repaint.
    PaintSegment { from: Point, to: Point, color: Color, width: f32 },
    PromptText { position: Point },
    Commit(Annotation),
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    tool: Tool,
    color: Color,
    stroke_width: f32,
    gesture: Gesture,
}

impl InteractionController {
    pub fn new(color: Color, stroke_width: f32) -> Self {
        Self { tool: Tool::default(), color, stroke_width, gesture: Gesture::Idle }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn stroke_width(&self) -> f32 {
        self.stroke_width
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    /// Applies to the next gesture; an in-progress one keeps its color.
    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    /// Switching tools drops any unfinished gesture without committing it.
    pub fn set_tool(&mut self, tool: Tool) -> Effect {
        self.tool = tool;
        self.discard()
    }

    /// Drops transient state, asking for a repaint when something was drawn for it.
    pub fn discard(&mut self) -> Effect {
        match std::mem::take(&mut self.gesture) {
            Gesture::Highlighting { .. } | Gesture::Drawing { .. } => Effect::Repaint,
            Gesture::Idle | Gesture::AwaitingText { .. } => Effect::None,
        }
    }

    pub fn preview(&self) -> Option<Preview> {
        match &self.gesture {
            Gesture::Highlighting { start, current } => {
                Some(Preview::Highlight { start: *start, current: *current, color: self.color })
            }
            Gesture::Drawing { points } => Some(Preview::Stroke {
                points: points.clone(),
                color: self.color,
                width: self.stroke_width,
            }),
            Gesture::Idle | Gesture::AwaitingText { .. } => None,
        }
    }

    pub fn pending_text(&self) -> Option<Point> {
        match self.gesture {
            Gesture::AwaitingText { position } => Some(position),
            _ => None,
        }
    }

    pub fn pointer_down(&mut self, at: Point) -> Effect {
        match self.tool {
            Tool::Select => Effect::None,
            Tool::Highlight => {
                self.gesture = Gesture::Highlighting { start: at, current: at };
                Effect::Repaint
            }
            Tool::Draw => {
                self.gesture = Gesture::Drawing { points: vec![at] };
                Effect::None
            }
            Tool::Text => {
                self.gesture = Gesture::AwaitingText { position: at };
                Effect::PromptText { position: at }
            }
        }
    }

    pub fn pointer_move(&mut self, at: Point) -> Effect {
        match &mut self.gesture {
            Gesture::Highlighting { current, .. } => {
                *current = at;
                Effect::Repaint
            }
            Gesture::Drawing { points } => {
                let from = points.last().copied().unwrap_or(at);
                points.push(at);
                Effect::PaintSegment { from, to: at, color: self.color, width: self.stroke_width }
            }
            Gesture::Idle | Gesture::AwaitingText { .. } => Effect::None,
        }
    }

    /// Completes a highlight or stroke on `page`.
    pub fn pointer_up(&mut self, at: Point, page: u32) -> Effect {
        match std::mem::take(&mut self.gesture) {
            Gesture::Highlighting { start, .. } => {
                Effect::Commit(Annotation::highlight(page, start, at, self.color))
            }
            Gesture::Drawing { mut points } => {
                points.push(at);
                Effect::Commit(Annotation::Drawing {
                    page,
                    points,
                    color: self.color,
                    width: self.stroke_width,
                })
            }
            pending @ Gesture::AwaitingText { .. } => {
                self.gesture = pending;
                Effect::None
            }
            Gesture::Idle => Effect::None,
        }
    }

    /// Leaving the surface ends the gesture exactly like releasing the pointer.
    pub fn pointer_leave(&mut self, at: Point, page: u32) -> Effect {
        self.pointer_up(at, page)
    }

    /// Commits the pending note. Empty text keeps the prompt open.
    pub fn confirm_text(&mut self, text: &str, page: u32) -> Effect {
        let Gesture::AwaitingText { position } = self.gesture else {
            return Effect::None;
        };
        if text.is_empty() {
            return Effect::None;
        }
        self.gesture = Gesture::Idle;
        Effect::Commit(Annotation::TextNote { page, position, text: text.to_owned(), color: self.color })
    }

    pub fn cancel_text(&mut self) -> Effect {
        if matches!(self.gesture, Gesture::AwaitingText { .. }) {
            self.gesture = Gesture::Idle;
        }
        Effect::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(tool: Tool) -> InteractionController {
        let mut controller = InteractionController::new(Color::rgb(255, 0, 0), 2.0);
        controller.set_tool(tool);
        controller
    }

    #[test]
    fn drawing_gesture_commits_one_stroke_with_every_point() {
        let mut controller = controller(Tool::Draw);

        assert_eq!(controller.pointer_down(Point::new(1.0, 1.0)), Effect::None);
        assert_eq!(
            controller.pointer_move(Point::new(2.0, 3.0)),
            Effect::PaintSegment {
                from: Point::new(1.0, 1.0),
                to: Point::new(2.0, 3.0),
                color: Color::rgb(255, 0, 0),
                width: 2.0,
            }
        );
        controller.pointer_move(Point::new(4.0, 5.0));
        let effect = controller.pointer_up(Point::new(6.0, 7.0), 2);

        assert_eq!(
            effect,
            Effect::Commit(Annotation::Drawing {
                page: 2,
                points: vec![
                    Point::new(1.0, 1.0),
                    Point::new(2.0, 3.0),
                    Point::new(4.0, 5.0),
                    Point::new(6.0, 7.0),
                ],
                color: Color::rgb(255, 0, 0),
                width: 2.0,
            })
        );
        assert_eq!(controller.gesture(), &Gesture::Idle);
    }

    #[test]
    fn highlight_previews_then_commits_normalized_on_leave() {
        let mut controller = controller(Tool::Highlight);

        assert_eq!(controller.pointer_down(Point::new(50.0, 40.0)), Effect::Repaint);
        assert_eq!(controller.pointer_move(Point::new(20.0, 20.0)), Effect::Repaint);
        assert_eq!(
            controller.preview(),
            Some(Preview::Highlight {
                start: Point::new(50.0, 40.0),
                current: Point::new(20.0, 20.0),
                color: Color::rgb(255, 0, 0),
            })
        );

        let effect = controller.pointer_leave(Point::new(10.0, 10.0), 1);
        assert_eq!(
            effect,
            Effect::Commit(Annotation::Highlight {
                page: 1,
                start: Point::new(10.0, 10.0),
                end: Point::new(50.0, 40.0),
                color: Color::rgb(255, 0, 0),
            })
        );
        assert_eq!(controller.preview(), None);
    }

    #[test]
    fn zero_length_gestures_still_commit() {
        let mut controller = controller(Tool::Highlight);
        controller.pointer_down(Point::new(5.0, 5.0));
        assert!(matches!(
            controller.pointer_up(Point::new(5.0, 5.0), 1),
            Effect::Commit(Annotation::Highlight { .. })
        ));

        let mut controller = self::controller(Tool::Draw);
        controller.pointer_down(Point::new(5.0, 5.0));
        let Effect::Commit(Annotation::Drawing { points, .. }) =
            controller.pointer_up(Point::new(5.0, 5.0), 1)
        else {
            panic!("single-click stroke should commit");
        };
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn text_prompt_ignores_empty_confirm_and_honours_cancel() {
        let mut controller = controller(Tool::Text);

        assert_eq!(
            controller.pointer_down(Point::new(30.0, 40.0)),
            Effect::PromptText { position: Point::new(30.0, 40.0) }
        );
        assert_eq!(controller.pointer_up(Point::new(30.0, 40.0), 1), Effect::None);
        assert_eq!(controller.confirm_text("", 1), Effect::None);
        assert_eq!(controller.pending_text(), Some(Point::new(30.0, 40.0)));

        assert_eq!(
            controller.confirm_text("Hi", 1),
            Effect::Commit(Annotation::TextNote {
                page: 1,
                position: Point::new(30.0, 40.0),
                text: "Hi".to_owned(),
                color: Color::rgb(255, 0, 0),
            })
        );

        controller.pointer_down(Point::new(1.0, 1.0));
        assert_eq!(controller.cancel_text(), Effect::None);
        assert_eq!(controller.pending_text(), None);
        assert_eq!(controller.confirm_text("late", 1), Effect::None);
    }

    #[test]
    fn switching_tools_discards_the_gesture() {
        let mut controller = controller(Tool::Draw);
        controller.pointer_down(Point::new(1.0, 1.0));
        controller.pointer_move(Point::new(2.0, 2.0));

        assert_eq!(controller.set_tool(Tool::Text), Effect::Repaint);
        assert_eq!(controller.gesture(), &Gesture::Idle);
        assert_eq!(controller.pointer_up(Point::new(3.0, 3.0), 1), Effect::None);
    }

    #[test]
    fn select_tool_is_inert() {
        let mut controller = controller(Tool::Select);
        assert_eq!(controller.pointer_down(Point::new(1.0, 1.0)), Effect::None);
        assert_eq!(controller.pointer_move(Point::new(2.0, 2.0)), Effect::None);
        assert_eq!(controller.pointer_up(Point::new(2.0, 2.0), 1), Effect::None);
    }

    #[test]
    fn tools_parse_from_names() {
        assert_eq!("Draw".parse::<Tool>(), Ok(Tool::Draw));
        assert_eq!("eraser".parse::<Tool>(), Err(UnknownTool("eraser".to_owned())));
    }
}
