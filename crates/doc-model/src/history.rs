//! Linear undo/redo log of annotation snapshots
//!
//! Every state is a full [`AnnotationSet`], so any entry is directly renderable
//! and undo/redo never replays anything. Transitions consume the old history
//! and return the new one; none of them can fail.

use crate::{Annotation, AnnotationSet};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    /// Older snapshots, oldest first.
    past: Vec<AnnotationSet>,
    present: AnnotationSet,
    /// Undone snapshots, nearest-undone first.
    future: VecDeque<AnnotationSet>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryAction {
    Commit(AnnotationSet),
    Add(Annotation),
    Clear,
    Undo,
    Redo,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn present(&self) -> &AnnotationSet {
        &self.present
    }

    pub fn past(&self) -> &[AnnotationSet] {
        &self.past
    }

    pub fn future(&self) -> impl ExactSizeIterator<Item = &AnnotationSet> + '_ {
        self.future.iter()
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Makes `next` the present snapshot and discards the redo branch.
    pub fn commit(mut self, next: AnnotationSet) -> Self {
        let previous = std::mem::replace(&mut self.present, next);
        self.past.push(previous);
        self.future.clear();
        self
    }

    /// Commits the present snapshot with `annotation` appended on top.
    pub fn add(self, annotation: Annotation) -> Self {
        let next = self.present.with(annotation);
        self.commit(next)
    }

    /// Commits an empty snapshot; undoable like any other edit.
    pub fn clear(self) -> Self {
        self.commit(AnnotationSet::new())
    }

    pub fn undo(mut self) -> Self {
        let Some(previous) = self.past.pop() else {
            return self;
        };

        let undone = std::mem::replace(&mut self.present, previous);
        self.future.push_front(undone);
        self
    }

    pub fn redo(mut self) -> Self {
        let Some(next) = self.future.pop_front() else {
            return self;
        };

        let replaced = std::mem::replace(&mut self.present, next);
        self.past.push(replaced);
        self
    }

    pub fn apply(self, action: HistoryAction) -> Self {
        match action {
            HistoryAction::Commit(next) => self.commit(next),
            HistoryAction::Add(annotation) => self.add(annotation),
            HistoryAction::Clear => self.clear(),
            HistoryAction::Undo => self.undo(),
            HistoryAction::Redo => self.redo(),
        }
    }
}
