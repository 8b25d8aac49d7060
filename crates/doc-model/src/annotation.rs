//! Annotation value types
//!
//! Annotations are immutable once committed: an edit is a new annotation in a
//! new [`AnnotationSet`], never a mutation of one that is already in history.

use crate::{Color, Point, Rect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One user-added overlay, scoped to a single 1-based page number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    /// Filled rectangle between two opposite corners.
    Highlight { page: u32, start: Point, end: Point, color: Color },
    /// Freehand polyline; point order is stroke order.
    #[serde(rename = "draw")]
    Drawing { page: u32, points: Vec<Point>, color: Color, width: f32 },
    /// A string anchored at its baseline origin.
    #[serde(rename = "text")]
    TextNote { page: u32, position: Point, text: String, color: Color },
}

impl Annotation {
    pub fn page(&self) -> u32 {
        match self {
            Self::Highlight { page, .. }
            | Self::Drawing { page, .. }
            | Self::TextNote { page, .. } => *page,
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Highlight { color, .. }
            | Self::Drawing { color, .. }
            | Self::TextNote { color, .. } => *color,
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Highlight { .. } => AnnotationKind::Highlight,
            Self::Drawing { .. } => AnnotationKind::Drawing,
            Self::TextNote { .. } => AnnotationKind::TextNote,
        }
    }

    /// Highlight constructor that stores the normalized corners (min first).
    pub fn highlight(page: u32, a: Point, b: Point, color: Color) -> Self {
        let rect = Rect::from_corners(a, b);
        Self::Highlight { page, start: rect.min(), end: rect.max(), color }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Highlight,
    Drawing,
    TextNote,
}

/// Immutable, ordered snapshot of every annotation in the session.
///
/// Insertion order is z-order: later entries paint over earlier ones. Cloning
/// is cheap, so history can hold many snapshots that share storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationSet {
    items: Arc<Vec<Annotation>>,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Annotation> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Annotation] {
        &self.items
    }

    /// Annotations on `page`, in z-order.
    pub fn on_page(&self, page: u32) -> impl Iterator<Item = &Annotation> + '_ {
        self.items.iter().filter(move |annotation| annotation.page() == page)
    }

    /// Returns a new snapshot with `annotation` appended on top.
    pub fn with(&self, annotation: Annotation) -> Self {
        let mut items = Vec::with_capacity(self.items.len() + 1);
        items.extend(self.items.iter().cloned());
        items.push(annotation);
        Self { items: Arc::new(items) }
    }
}

impl FromIterator<Annotation> for AnnotationSet {
    fn from_iter<I: IntoIterator<Item = Annotation>>(iter: I) -> Self {
        Self { items: Arc::new(iter.into_iter().collect()) }
    }
}

impl<'a> IntoIterator for &'a AnnotationSet {
    type Item = &'a Annotation;
    type IntoIter = std::slice::Iter<'a, Annotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
