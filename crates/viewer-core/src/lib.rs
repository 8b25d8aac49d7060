//! The annotation surface: render coordination, pointer interaction, search
//! overlay and export, tied together by [`Editor`].

mod coordinator;
mod editor;
mod error;
mod export;
mod interaction;
mod paint;
mod raster;
mod search;
mod surface;

pub use coordinator::{LoadOutcome, RenderCoordinator, RenderPhase, RenderSettings};
pub use editor::Editor;
pub use error::{ErrorBanner, ErrorKind, ViewerError};
pub use export::{export_page, replay_page, CoordinateTransform, ExportSettings, ExportedDocument};
pub use interaction::{Effect, Gesture, InteractionController, Tool, UnknownTool};
pub use paint::{draw_annotation, draw_preview, Preview, PREVIEW_ALPHA};
pub use raster::RasterSurface;
pub use search::{order_items, paint_matches, whole_word_pattern, OverlayMode};
pub use surface::{approximate_text_width, BlendMode, DisplayList, DrawCommand, Paint, Surface};
