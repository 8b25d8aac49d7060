//! One annotation session: history, interaction state and the render coordinator.
//!
//! Every history transition and tool update goes through here and ends in a
//! repaint, so the surface always shows `history.present()` for the current page.

use crate::coordinator::{LoadOutcome, RenderCoordinator, RenderSettings};
use crate::error::{ErrorBanner, ErrorKind, ViewerError};
use crate::export::{export_page, ExportSettings, ExportedDocument};
use crate::interaction::{Effect, InteractionController, Tool};
use crate::search::{paint_matches, OverlayMode};
use crate::surface::Surface;
use doc_model::{AnnotationSet, Color, ColorParseError, History, HistoryAction, Point, Preferences};
use pdf_engine::{DocumentWriter, LopdfRasterizer, LopdfWriter, OpenSource, Rasterizer};
use tracing::{debug, info, warn};

pub struct Editor<R: Rasterizer, S: Surface> {
    source: OpenSource,
    preferences: Preferences,
    coordinator: RenderCoordinator<R, S>,
    controller: InteractionController,
    history: History,
    page: u32,
    banner: Option<ErrorBanner>,
}

impl<S: Surface> Editor<LopdfRasterizer, S> {
    /// Fetches and parses the document, then renders its first page.
    pub async fn open(
        source: OpenSource,
        preferences: Preferences,
        surface: S,
    ) -> Result<Self, ViewerError> {
        let rasterizer = LopdfRasterizer::open(&source)
            .map_err(|error| ViewerError::Load { target: source.describe(), source: error })?;
        info!(source = %source.describe(), pages = rasterizer.page_count(), "document opened");

        let mut editor = Self::new(source, rasterizer, surface, preferences);
        editor.go_to_page(1).await?;
        Ok(editor)
    }

    pub fn export(&mut self) -> Result<ExportedDocument, ViewerError> {
        self.export_with::<LopdfWriter>()
    }
}

impl<R: Rasterizer, S: Surface> Editor<R, S> {
    /// Builds a session without rendering anything yet.
    pub fn new(source: OpenSource, rasterizer: R, surface: S, preferences: Preferences) -> Self {
        let preferences = preferences.sanitized();
        let coordinator =
            RenderCoordinator::new(rasterizer, surface, RenderSettings::from(&preferences));
        let controller =
            InteractionController::new(preferences.annotation_color, preferences.stroke_width);
        Self {
            source,
            preferences,
            coordinator,
            controller,
            history: History::new(),
            page: 1,
            banner: None,
        }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn coordinator(&self) -> &RenderCoordinator<R, S> {
        &self.coordinator
    }

    pub fn interaction(&self) -> &InteractionController {
        &self.controller
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn annotations(&self) -> &AnnotationSet {
        self.history.present()
    }

    pub fn current_page(&self) -> u32 {
        self.page
    }

    pub fn page_count(&self) -> u32 {
        self.coordinator.page_count()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn banner(&self) -> Option<&ErrorBanner> {
        self.banner.as_ref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    /// Presentation only; returns the new setting.
    pub fn toggle_theme(&mut self) -> bool {
        self.preferences.dark_theme = !self.preferences.dark_theme;
        self.preferences.dark_theme
    }

    pub async fn go_to_page(&mut self, page: u32) -> Result<(), ViewerError> {
        let discarded = self.controller.discard();
        let outcome = self.coordinator.load_page(page, self.history.present()).await;
        match outcome {
            Ok(LoadOutcome::Rendered(_)) => {
                self.page = page;
                self.clear_banner(&[ErrorKind::Load, ErrorKind::Render]);
                Ok(())
            }
            Ok(LoadOutcome::Superseded) => Ok(()),
            Err(error) => {
                if discarded == Effect::Repaint {
                    self.repaint();
                }
                self.record(&error);
                Err(error)
            }
        }
    }

    /// No-op on the last page.
    pub async fn next_page(&mut self) -> Result<(), ViewerError> {
        if self.page >= self.page_count() {
            return Ok(());
        }
        self.go_to_page(self.page + 1).await
    }

    /// No-op on the first page.
    pub async fn previous_page(&mut self) -> Result<(), ViewerError> {
        if self.page <= 1 {
            return Ok(());
        }
        self.go_to_page(self.page - 1).await
    }

    pub fn tool(&self) -> Tool {
        self.controller.tool()
    }

    pub fn set_tool(&mut self, tool: Tool) {
        debug!(%tool, "tool selected");
        let effect = self.controller.set_tool(tool);
        self.apply(effect);
    }

    pub fn color(&self) -> Color {
        self.controller.color()
    }

    /// Accepts `#rrggbb` or `#rgb`; an invalid value leaves the color unchanged.
    pub fn set_color(&mut self, hex: &str) -> Result<Color, ColorParseError> {
        let color = Color::from_hex(hex)?;
        self.controller.set_color(color);
        Ok(color)
    }

    pub fn pointer_down(&mut self, at: Point) {
        let effect = self.controller.pointer_down(at);
        self.apply(effect);
    }

    pub fn pointer_move(&mut self, at: Point) {
        let effect = self.controller.pointer_move(at);
        self.apply(effect);
    }

    pub fn pointer_up(&mut self, at: Point) {
        let effect = self.controller.pointer_up(at, self.page);
        self.apply(effect);
    }

    pub fn pointer_leave(&mut self, at: Point) {
        let effect = self.controller.pointer_leave(at, self.page);
        self.apply(effect);
    }

    /// Anchor of the open text prompt, if any.
    pub fn pending_text(&self) -> Option<Point> {
        self.controller.pending_text()
    }

    /// Returns whether a note was committed.
    pub fn confirm_text(&mut self, text: &str) -> bool {
        let effect = self.controller.confirm_text(text, self.page);
        let committed = matches!(effect, Effect::Commit(_));
        self.apply(effect);
        committed
    }

    pub fn cancel_text(&mut self) {
        let effect = self.controller.cancel_text();
        self.apply(effect);
    }

    pub fn undo(&mut self) {
        self.transition(HistoryAction::Undo);
    }

    pub fn redo(&mut self) {
        self.transition(HistoryAction::Redo);
    }

    pub fn clear_all(&mut self) {
        self.transition(HistoryAction::Clear);
    }

    /// Highlights whole-word matches on the current page; returns the match count.
    pub async fn search(&mut self, query: &str) -> Result<usize, ViewerError> {
        self.overlay(query, OverlayMode::Highlight).await
    }

    /// Paints `replacement` over each match. Nothing happens for an empty replacement.
    pub async fn replace(&mut self, query: &str, replacement: &str) -> Result<usize, ViewerError> {
        if replacement.is_empty() {
            return Ok(0);
        }
        self.overlay(query, OverlayMode::Replace(replacement)).await
    }

    /// Bakes the current page's annotations into a fresh copy of the source document.
    pub fn export_with<W: DocumentWriter>(&mut self) -> Result<ExportedDocument, ViewerError> {
        match self.build_export::<W>() {
            Ok(document) => {
                self.clear_banner(&[ErrorKind::Export]);
                info!(
                    file_name = %document.file_name,
                    bytes = document.bytes.len(),
                    "export complete"
                );
                Ok(document)
            }
            Err(error) => {
                self.record(&error);
                Err(error)
            }
        }
    }

    /// Cancels in-flight work and releases the page.
    pub fn close(&mut self) {
        self.controller.discard();
        self.coordinator.close();
        info!("session closed");
    }

    fn repaint(&self) {
        let preview = self.controller.preview();
        self.coordinator.repaint(self.history.present(), preview.as_ref());
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::None | Effect::PromptText { .. } => {}
            Effect::Repaint => self.repaint(),
            Effect::PaintSegment { from, to, color, width } => {
                self.coordinator
                    .with_surface(|surface| surface.stroke_polyline(&[from, to], color, width));
            }
            Effect::Commit(annotation) => self.transition(HistoryAction::Add(annotation)),
        }
    }

    fn transition(&mut self, action: HistoryAction) {
        let label = match &action {
            HistoryAction::Commit(_) => "commit",
            HistoryAction::Add(_) => "add",
            HistoryAction::Clear => "clear",
            HistoryAction::Undo => "undo",
            HistoryAction::Redo => "redo",
        };
        self.history = std::mem::take(&mut self.history).apply(action);
        info!(
            action = label,
            annotations = self.history.present().len(),
            past = self.history.past().len(),
            future = self.history.future().len(),
            "history updated"
        );
        self.repaint();
    }

    async fn overlay(&mut self, query: &str, mode: OverlayMode<'_>) -> Result<usize, ViewerError> {
        if query.is_empty() {
            return Ok(0);
        }
        let layout = self.coordinator.text_layout().await;
        let items = match layout {
            Ok(items) => items,
            Err(error) => {
                self.record(&error);
                return Err(error);
            }
        };

        self.repaint();
        let scale = self.coordinator.settings().scale;
        let matches = self
            .coordinator
            .with_surface(|surface| paint_matches(surface, &items, query, mode, scale))?;
        info!(query, page = self.page, matches, "search overlay painted");
        Ok(matches)
    }

    fn build_export<W: DocumentWriter>(&self) -> Result<ExportedDocument, ViewerError> {
        let page = self.coordinator.current_page().ok_or(ViewerError::NoDocument)?;
        let viewport = self.coordinator.viewport().ok_or(ViewerError::NoDocument)?;
        let source_bytes = self.source.fetch().map_err(ViewerError::Export)?;
        let settings = ExportSettings {
            page,
            canvas_width: viewport.width_px,
            canvas_height: viewport.height_px,
            text_font_px: self.preferences.text_font_px,
            highlight_opacity: self.preferences.highlight_export_opacity,
        };
        let bytes = export_page::<W>(&source_bytes, self.history.present(), &settings)?;
        Ok(ExportedDocument { file_name: self.preferences.export_file_name.clone(), bytes })
    }

    fn record(&mut self, error: &ViewerError) {
        if let Some(banner) = ErrorBanner::from_error(error) {
            warn!(kind = %banner.kind, error = %error, "operation failed");
            self.banner = Some(banner);
        }
    }

    fn clear_banner(&mut self, kinds: &[ErrorKind]) {
        if self.banner.as_ref().is_some_and(|banner| kinds.contains(&banner.kind)) {
            self.banner = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::GatedRasterizer;
    use crate::surface::{DisplayList, DrawCommand};
    use doc_model::Annotation;
    use futures::executor::block_on;
    use pdf_engine::fixtures::{build_pdf, PageSpec};
    use pdf_engine::{extract_text_items, PdfEngineError};

    fn fixture() -> Vec<u8> {
        build_pdf(&[
            PageSpec::letter(&["The quick brown fox", "jumps over the lazy dog", "The end"]),
            PageSpec::new(300.0, 400.0, &["Second page"]),
        ])
    }

    fn open_editor() -> Editor<LopdfRasterizer, DisplayList> {
        block_on(Editor::open(
            OpenSource::Bytes(fixture()),
            Preferences::default(),
            DisplayList::default(),
        ))
        .expect("fixture should open")
    }

    fn drag(editor: &mut Editor<LopdfRasterizer, DisplayList>, points: &[(f32, f32)]) {
        let (first, rest) = points.split_first().expect("drag needs a point");
        editor.pointer_down(Point::from(*first));
        if let Some((last, middle)) = rest.split_last() {
            for point in middle {
                editor.pointer_move(Point::from(*point));
            }
            editor.pointer_up(Point::from(*last));
        }
    }

    #[test]
    fn opening_renders_the_first_page_at_configured_scale() {
        let editor = open_editor();

        assert_eq!(editor.page_count(), 2);
        assert_eq!(editor.current_page(), 1);
        let surface = editor.coordinator().surface();
        assert_eq!((surface.width(), surface.height()), (918, 1188));
    }

    #[test]
    fn drawing_gesture_is_one_undo_step() {
        let mut editor = open_editor();
        editor.set_tool(Tool::Draw);

        editor.pointer_down(Point::new(10.0, 10.0));
        let repaints = editor.coordinator().surface().clear_count();
        editor.pointer_move(Point::new(20.0, 20.0));
        editor.pointer_move(Point::new(30.0, 25.0));

        {
            let surface = editor.coordinator().surface();
            assert_eq!(surface.clear_count(), repaints);
            assert!(matches!(
                surface.commands().last(),
                Some(DrawCommand::StrokePolyline { points, .. }) if points.len() == 2
            ));
        }

        editor.pointer_up(Point::new(40.0, 30.0));
        assert_eq!(editor.annotations().len(), 1);
        let Some(Annotation::Drawing { points, page, .. }) = editor.annotations().iter().next() else {
            panic!("expected a drawing");
        };
        assert_eq!(*page, 1);
        assert_eq!(points.len(), 4);

        editor.undo();
        assert!(editor.annotations().is_empty());
        assert!(!editor.can_undo());
        assert!(editor.can_redo());
    }

    #[test]
    fn note_and_highlight_undo_redo_scenario() {
        let mut editor = open_editor();

        editor.set_tool(Tool::Text);
        editor.pointer_down(Point::new(100.0, 100.0));
        assert_eq!(editor.pending_text(), Some(Point::new(100.0, 100.0)));
        assert!(!editor.confirm_text(""));
        assert!(editor.confirm_text("Hi"));

        editor.set_tool(Tool::Highlight);
        drag(&mut editor, &[(10.0, 10.0), (30.0, 20.0), (50.0, 40.0)]);
        assert_eq!(editor.annotations().len(), 2);

        editor.undo();
        let kinds: Vec<_> = editor.annotations().iter().map(Annotation::kind).collect();
        assert_eq!(kinds, vec![doc_model::AnnotationKind::TextNote]);

        editor.redo();
        assert_eq!(editor.annotations().len(), 2);
        assert_eq!(editor.coordinator().surface().text_runs(), vec!["Hi"]);
    }

    #[test]
    fn cancelled_text_prompt_records_nothing() {
        let mut editor = open_editor();
        editor.set_tool(Tool::Text);
        editor.pointer_down(Point::new(5.0, 5.0));
        editor.cancel_text();

        assert_eq!(editor.pending_text(), None);
        assert!(!editor.can_undo());
    }

    #[test]
    fn switching_tool_mid_stroke_discards_it() {
        let mut editor = open_editor();
        editor.set_tool(Tool::Draw);
        editor.pointer_down(Point::new(1.0, 1.0));
        editor.pointer_move(Point::new(5.0, 5.0));

        editor.set_tool(Tool::Highlight);

        assert!(editor.annotations().is_empty());
        assert!(!editor
            .coordinator()
            .surface()
            .commands()
            .iter()
            .any(|command| matches!(command, DrawCommand::StrokePolyline { .. })));
    }

    #[test]
    fn annotations_follow_their_page() {
        let mut editor = open_editor();
        editor.set_tool(Tool::Text);
        editor.pointer_down(Point::new(50.0, 50.0));
        editor.confirm_text("first page");

        block_on(editor.next_page()).expect("page 2 should load");
        assert_eq!(editor.current_page(), 2);
        assert!(editor.coordinator().surface().text_runs().is_empty());

        block_on(editor.next_page()).expect("next on last page is a no-op");
        assert_eq!(editor.current_page(), 2);

        block_on(editor.previous_page()).expect("page 1 should load");
        assert_eq!(editor.coordinator().surface().text_runs(), vec!["first page"]);
    }

    #[test]
    fn out_of_range_navigation_is_rejected_quietly() {
        let mut editor = open_editor();

        block_on(editor.previous_page()).expect("previous on first page is a no-op");
        let error = block_on(editor.go_to_page(9)).expect_err("page 9 does not exist");

        assert!(matches!(error, ViewerError::PageOutOfRange { page: 9, page_count: 2 }));
        assert_eq!(editor.current_page(), 1);
        assert_eq!(editor.banner(), None);
    }

    #[test]
    fn clear_all_is_undoable() {
        let mut editor = open_editor();
        editor.set_tool(Tool::Highlight);
        drag(&mut editor, &[(0.0, 0.0), (10.0, 10.0)]);
        drag(&mut editor, &[(20.0, 20.0), (30.0, 30.0)]);

        editor.clear_all();
        assert!(editor.annotations().is_empty());
        assert!(!editor.can_redo());

        editor.undo();
        assert_eq!(editor.annotations().len(), 2);
    }

    #[test]
    fn invalid_color_keeps_previous_choice() {
        let mut editor = open_editor();

        assert_eq!(editor.set_color("#0000FF"), Ok(Color::rgb(0, 0, 255)));
        assert!(editor.set_color("blue").is_err());
        assert_eq!(editor.color(), Color::rgb(0, 0, 255));
    }

    #[test]
    fn theme_toggle_leaves_annotations_alone() {
        let mut editor = open_editor();
        editor.set_tool(Tool::Highlight);
        drag(&mut editor, &[(10.0, 10.0), (50.0, 40.0)]);

        assert!(editor.toggle_theme());
        assert!(editor.preferences().dark_theme);
        assert!(!editor.toggle_theme());
        assert_eq!(editor.annotations().len(), 1);
        assert!(editor.can_undo());
    }

    #[test]
    fn search_counts_whole_words_and_repaint_wipes_overlay() {
        let mut editor = open_editor();

        let matches = block_on(editor.search("the")).expect("search should succeed");
        assert_eq!(matches, 3);
        let highlighted = editor
            .coordinator()
            .surface()
            .commands()
            .iter()
            .filter(|command| {
                matches!(command, DrawCommand::FillRect { paint, .. } if paint.color == Color::YELLOW)
            })
            .count();
        assert_eq!(highlighted, 3);

        editor.undo();
        assert!(!editor
            .coordinator()
            .surface()
            .commands()
            .iter()
            .any(|command| matches!(command, DrawCommand::FillRect { paint, .. } if paint.color == Color::YELLOW)));
        assert!(!editor.can_undo());
    }

    #[test]
    fn replace_draws_replacement_without_touching_history() {
        let mut editor = open_editor();

        let matches = block_on(editor.replace("fox", "cat")).expect("replace should succeed");

        assert_eq!(matches, 1);
        assert_eq!(editor.coordinator().surface().text_runs(), vec!["cat"]);
        assert!(editor.annotations().is_empty());
        assert_eq!(block_on(editor.replace("fox", "")).expect("no-op"), 0);
    }

    #[test]
    fn export_bakes_current_page_annotations() {
        let mut editor = open_editor();
        editor.set_tool(Tool::Text);
        editor.pointer_down(Point::new(150.0, 300.0));
        editor.confirm_text("Hi");

        let exported = editor.export().expect("export should succeed");

        assert_eq!(exported.file_name, "annotated-document.pdf");
        let document = lopdf::Document::load_mem(&exported.bytes).expect("output should parse");
        let content =
            document.get_page_content(document.get_pages()[&1]).expect("content should load");
        let items = extract_text_items(&content).expect("text should extract");
        let note = items.iter().find(|item| item.text == "Hi").expect("note should be exported");
        // 918x1188 surface over a 612x792 page: both axes scale by 2/3.
        assert!((note.x() - 100.0).abs() < 1e-3);
        assert!((note.baseline_y() - 592.0).abs() < 1e-3);
    }

    #[test]
    fn export_failure_sets_banner_and_keeps_history() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("doc.pdf");
        std::fs::write(&path, fixture()).expect("fixture should be written");
        let mut editor = block_on(Editor::open(
            OpenSource::Path(path.clone()),
            Preferences::default(),
            DisplayList::default(),
        ))
        .expect("fixture should open");
        editor.set_tool(Tool::Highlight);
        drag(&mut editor, &[(0.0, 0.0), (10.0, 10.0)]);

        std::fs::remove_file(&path).expect("fixture should be removed");
        let error = editor.export().expect_err("source is gone");

        assert!(matches!(error, ViewerError::Export(PdfEngineError::Io(_))));
        assert_eq!(editor.banner().map(|banner| banner.kind), Some(ErrorKind::Export));
        assert_eq!(editor.annotations().len(), 1);

        std::fs::write(&path, fixture()).expect("fixture should be restored");
        editor.export().expect("retry should succeed");
        assert_eq!(editor.banner(), None);
    }

    #[test]
    fn render_failure_sets_banner_until_next_good_load() {
        let mut editor = Editor::new(
            OpenSource::Bytes(Vec::new()),
            GatedRasterizer::new(3).failing_render(2),
            DisplayList::default(),
            Preferences::default(),
        );
        block_on(editor.go_to_page(1)).expect("page 1 should load");

        block_on(editor.go_to_page(2)).expect_err("page 2 fails to render");
        assert_eq!(editor.current_page(), 1);
        assert_eq!(editor.banner().map(|banner| banner.kind), Some(ErrorKind::Render));

        block_on(editor.go_to_page(3)).expect("page 3 should load");
        assert_eq!(editor.banner(), None);
    }

    #[test]
    fn search_keeps_working_on_the_page_left_after_a_failed_load() {
        let mut editor = Editor::new(
            OpenSource::Bytes(Vec::new()),
            GatedRasterizer::new(3).failing_render(2),
            DisplayList::default(),
            Preferences::default(),
        );
        block_on(editor.go_to_page(1)).expect("page 1 should load");
        assert_eq!(block_on(editor.search("x")).expect("search on page 1"), 0);

        block_on(editor.go_to_page(2)).expect_err("page 2 fails to render");
        assert_eq!(editor.coordinator().current_page(), Some(1));

        assert_eq!(block_on(editor.search("x")).expect("page 1 is still searchable"), 0);
        assert_eq!(block_on(editor.replace("x", "y")).expect("and replaceable"), 0);
        assert_eq!(editor.banner().map(|banner| banner.kind), Some(ErrorKind::Render));
    }

    #[test]
    fn close_releases_the_page() {
        let mut editor = open_editor();
        editor.close();
        assert!(!editor.coordinator().has_live_page());
    }
}
