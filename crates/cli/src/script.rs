use anyhow::{Context, Result};
use doc_model::Point;
use pdf_engine::Rasterizer;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use viewer_core::{Editor, Surface, Tool};

/// One recorded editor interaction. Coordinates are surface pixels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Tool { tool: Tool },
    Color { color: String },
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up { x: f32, y: f32 },
    Leave { x: f32, y: f32 },
    Text { text: String },
    CancelText,
    Undo,
    Redo,
    Clear,
    Page { page: u32 },
    NextPage,
    PreviousPage,
}

pub fn load_script(path: &Path) -> Result<Vec<Step>> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse script {}", path.display()))
}

pub async fn replay<R: Rasterizer, S: Surface>(
    editor: &mut Editor<R, S>,
    steps: &[Step],
) -> Result<()> {
    for (index, step) in steps.iter().enumerate() {
        apply(editor, step)
            .await
            .with_context(|| format!("script step {} ({step:?}) failed", index + 1))?;
    }
    Ok(())
}

async fn apply<R: Rasterizer, S: Surface>(editor: &mut Editor<R, S>, step: &Step) -> Result<()> {
    match step {
        Step::Tool { tool } => editor.set_tool(*tool),
        Step::Color { color } => {
            editor.set_color(color)?;
        }
        Step::Down { x, y } => editor.pointer_down(Point::new(*x, *y)),
        Step::Move { x, y } => editor.pointer_move(Point::new(*x, *y)),
        Step::Up { x, y } => editor.pointer_up(Point::new(*x, *y)),
        Step::Leave { x, y } => editor.pointer_leave(Point::new(*x, *y)),
        Step::Text { text } => {
            if !editor.confirm_text(text) {
                tracing::warn!(text = %text, "text step ignored: no open prompt or empty text");
            }
        }
        Step::CancelText => editor.cancel_text(),
        Step::Undo => editor.undo(),
        Step::Redo => editor.redo(),
        Step::Clear => editor.clear_all(),
        Step::Page { page } => editor.go_to_page(*page).await?,
        Step::NextPage => editor.next_page().await?,
        Step::PreviousPage => editor.previous_page().await?,
    }
    Ok(())
}
