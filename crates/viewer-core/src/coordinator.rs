//! Page lifecycle and the single "redraw everything" entry point.
//!
//! At most one page handle is live. Starting a load cancels the in-flight
//! render and releases the previous handle before the next page is fetched,
//! and results are installed only if no newer load started meanwhile.

use crate::error::ViewerError;
use crate::paint::{draw_annotation, draw_preview, Preview};
use crate::surface::{Paint, Surface};
use doc_model::{AnnotationSet, Color, Preferences};
use pdf_engine::{
    CancellationToken, PageHandle, PdfEngineError, Rasterizer, RgbaImage, TextItem, Viewport,
};
use std::cell::{Ref, RefCell};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub scale: f32,
    pub background: Color,
    pub text_font_px: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from(&Preferences::default())
    }
}

impl From<&Preferences> for RenderSettings {
    fn from(preferences: &Preferences) -> Self {
        Self {
            scale: preferences.scale,
            background: preferences.background_color,
            text_font_px: preferences.text_font_px,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Loading { page: u32 },
    Rendered { page: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOutcome {
    Rendered(Viewport),
    /// A newer load started before this one finished; nothing was painted.
    Superseded,
}

struct Installed {
    page_number: u32,
    viewport: Viewport,
    raster: RgbaImage,
}

struct Loaded<P> {
    handle: P,
    viewport: Viewport,
    raster: RgbaImage,
}

struct PageContext<P> {
    phase: RenderPhase,
    handle: Option<P>,
    in_flight: Option<CancellationToken>,
    generation: u64,
    installed: Option<Installed>,
}

pub struct RenderCoordinator<R: Rasterizer, S: Surface> {
    rasterizer: R,
    settings: RenderSettings,
    surface: RefCell<S>,
    context: RefCell<PageContext<R::Page>>,
}

impl<R: Rasterizer, S: Surface> RenderCoordinator<R, S> {
    pub fn new(rasterizer: R, surface: S, settings: RenderSettings) -> Self {
        Self {
            rasterizer,
            settings,
            surface: RefCell::new(surface),
            context: RefCell::new(PageContext {
                phase: RenderPhase::Idle,
                handle: None,
                in_flight: None,
                generation: 0,
                installed: None,
            }),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.rasterizer.page_count()
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    pub fn phase(&self) -> RenderPhase {
        self.context.borrow().phase
    }

    /// Page whose pixels are currently on the surface.
    pub fn current_page(&self) -> Option<u32> {
        self.context.borrow().installed.as_ref().map(|installed| installed.page_number)
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.context.borrow().installed.as_ref().map(|installed| installed.viewport)
    }

    pub fn has_live_page(&self) -> bool {
        self.context.borrow().handle.is_some()
    }

    pub fn surface(&self) -> Ref<'_, S> {
        self.surface.borrow()
    }

    /// Direct surface access for the incremental stroke segment.
    pub fn with_surface<T>(&self, paint: impl FnOnce(&mut S) -> T) -> T {
        let mut surface = self.surface.borrow_mut();
        paint(&mut *surface)
    }

    /// Fetches, renders and installs `page_number`, then repaints `annotations` over it.
    ///
    /// A failed load leaves the previously installed page on the surface.
    pub async fn load_page(
        &self,
        page_number: u32,
        annotations: &AnnotationSet,
    ) -> Result<LoadOutcome, ViewerError> {
        let page_count = self.page_count();
        if page_number == 0 || page_number > page_count {
            return Err(ViewerError::PageOutOfRange { page: page_number, page_count });
        }

        let (generation, token) = self.begin_load(page_number);
        let loaded = self.fetch_and_render(page_number, &token).await;

        let mut context = self.context.borrow_mut();
        if token.is_cancelled() || context.generation != generation {
            if let Ok(mut stale) = loaded {
                stale.handle.release();
            }
            debug!(page = page_number, "discarded superseded page load");
            return Ok(LoadOutcome::Superseded);
        }
        context.in_flight = None;

        match loaded {
            Ok(Loaded { handle, viewport, raster }) => {
                context.handle = Some(handle);
                context.installed = Some(Installed { page_number, viewport, raster });
                context.phase = RenderPhase::Rendered { page: page_number };
                drop(context);

                self.surface.borrow_mut().resize(viewport.width_px, viewport.height_px);
                self.repaint(annotations, None);
                info!(
                    page = page_number,
                    width_px = viewport.width_px,
                    height_px = viewport.height_px,
                    "page rendered"
                );
                Ok(LoadOutcome::Rendered(viewport))
            }
            Err(error) if error.is_cancellation() => {
                context.phase = Self::settled_phase(&context);
                Ok(LoadOutcome::Superseded)
            }
            Err(error) => {
                context.phase = Self::settled_phase(&context);
                warn!(page = page_number, %error, "page load failed");
                Err(error)
            }
        }
    }

    /// Clears the surface and redraws background, page pixels, the annotations
    /// on the installed page in order, then `preview` on top.
    pub fn repaint(&self, annotations: &AnnotationSet, preview: Option<&Preview>) {
        let context = self.context.borrow();
        let mut surface = self.surface.borrow_mut();
        surface.clear();

        let Some(installed) = &context.installed else {
            return;
        };
        let bounds = surface.bounds();
        surface.fill_rect(bounds, Paint::solid(self.settings.background));
        surface.draw_image(&installed.raster);
        for annotation in annotations.on_page(installed.page_number) {
            draw_annotation(&mut *surface, annotation, self.settings.text_font_px);
        }
        if let Some(preview) = preview {
            draw_preview(&mut *surface, preview);
        }
    }

    /// Text layout of the displayed page.
    ///
    /// When a failed load left the previous page on screen without a handle,
    /// the page is fetched again and kept live unless a newer load started.
    pub async fn text_layout(&self) -> Result<Vec<TextItem>, ViewerError> {
        let (handle, displayed, generation) = {
            let mut context = self.context.borrow_mut();
            let displayed = context.installed.as_ref().map(|installed| installed.page_number);
            (context.handle.take(), displayed, context.generation)
        };
        let mut handle = match (handle, displayed) {
            (Some(handle), _) => handle,
            (None, Some(page)) => {
                debug!(page, "reacquiring displayed page");
                self.rasterizer.page(page).await.map_err(|source| ViewerError::Load {
                    target: format!("page {page}"),
                    source,
                })?
            }
            (None, None) => return Err(ViewerError::NoDocument),
        };

        let page = handle.page_number();
        let items = handle.text_content().await;

        let mut context = self.context.borrow_mut();
        let still_current = context.generation == generation && context.in_flight.is_none();
        if still_current && context.handle.is_none() {
            context.handle = Some(handle);
        } else {
            handle.release();
        }
        items.map_err(|source| ViewerError::Load { target: format!("text layout of page {page}"), source })
    }

    /// Cancels any in-flight render and releases the live page.
    pub fn close(&self) {
        let mut context = self.context.borrow_mut();
        context.generation += 1;
        if let Some(token) = context.in_flight.take() {
            token.cancel();
        }
        if let Some(mut handle) = context.handle.take() {
            handle.release();
        }
        context.installed = None;
        context.phase = RenderPhase::Idle;
        debug!("render coordinator closed");
    }

    fn begin_load(&self, page_number: u32) -> (u64, CancellationToken) {
        let mut context = self.context.borrow_mut();
        if let Some(previous) = context.in_flight.take() {
            previous.cancel();
            debug!(page = page_number, "cancelled in-flight render");
        }
        if let Some(mut handle) = context.handle.take() {
            handle.release();
        }
        context.generation += 1;
        let token = CancellationToken::new();
        context.in_flight = Some(token.clone());
        context.phase = RenderPhase::Loading { page: page_number };
        (context.generation, token)
    }

    async fn fetch_and_render(
        &self,
        page_number: u32,
        token: &CancellationToken,
    ) -> Result<Loaded<R::Page>, ViewerError> {
        let mut handle = self.rasterizer.page(page_number).await.map_err(|source| {
            ViewerError::Load { target: format!("page {page_number}"), source }
        })?;
        if token.is_cancelled() {
            handle.release();
            return Err(ViewerError::Load {
                target: format!("page {page_number}"),
                source: PdfEngineError::Cancelled,
            });
        }

        let viewport = handle.viewport(self.settings.scale);
        match handle.render(viewport, token.clone()).await {
            Ok(raster) => Ok(Loaded { handle, viewport, raster }),
            Err(source) => {
                handle.release();
                Err(ViewerError::Render { page: page_number, source })
            }
        }
    }

    fn settled_phase(context: &PageContext<R::Page>) -> RenderPhase {
        match &context.installed {
            Some(installed) => RenderPhase::Rendered { page: installed.page_number },
            None => RenderPhase::Idle,
        }
    }
}

impl<R: Rasterizer, S: Surface> Drop for RenderCoordinator<R, S> {
    fn drop(&mut self) {
        let context = self.context.get_mut();
        if let Some(token) = context.in_flight.take() {
            token.cancel();
        }
        if let Some(handle) = context.handle.as_mut() {
            handle.release();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::surface::{DisplayList, DrawCommand};
    use doc_model::{Annotation, Point};
    use futures::channel::oneshot;
    use futures::executor::block_on;
    use futures::join;
    use pdf_engine::{yield_now, PageSize};
    use std::collections::HashMap;
    use std::rc::Rc;

    type EventLog = Rc<RefCell<Vec<String>>>;

    /// Pages are `100 * n` points wide; fetches can be held behind a oneshot gate.
    pub(crate) struct GatedRasterizer {
        page_count: u32,
        gates: RefCell<HashMap<u32, oneshot::Receiver<()>>>,
        failing_render: Option<u32>,
        pub(crate) events: EventLog,
    }

    impl GatedRasterizer {
        pub(crate) fn new(page_count: u32) -> Self {
            Self {
                page_count,
                gates: RefCell::new(HashMap::new()),
                failing_render: None,
                events: Rc::default(),
            }
        }

        pub(crate) fn gate(self, page: u32, gate: oneshot::Receiver<()>) -> Self {
            self.gates.borrow_mut().insert(page, gate);
            self
        }

        pub(crate) fn failing_render(mut self, page: u32) -> Self {
            self.failing_render = Some(page);
            self
        }
    }

    impl Rasterizer for GatedRasterizer {
        type Page = GatedPage;

        fn page_count(&self) -> u32 {
            self.page_count
        }

        async fn page(&self, page_number: u32) -> Result<GatedPage, PdfEngineError> {
            let gate = self.gates.borrow_mut().remove(&page_number);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.events.borrow_mut().push(format!("acquire {page_number}"));
            Ok(GatedPage {
                page_number,
                fails: self.failing_render == Some(page_number),
                released: false,
                events: Rc::clone(&self.events),
            })
        }
    }

    pub(crate) struct GatedPage {
        page_number: u32,
        fails: bool,
        released: bool,
        events: EventLog,
    }

    impl PageHandle for GatedPage {
        fn page_number(&self) -> u32 {
            self.page_number
        }

        fn size(&self) -> PageSize {
            PageSize { width_pt: 100.0 * self.page_number as f32, height_pt: 100.0 }
        }

        async fn render(
            &self,
            viewport: Viewport,
            cancel: CancellationToken,
        ) -> Result<RgbaImage, PdfEngineError> {
            cancel.check()?;
            yield_now().await;
            cancel.check()?;
            if self.fails {
                return Err(PdfEngineError::Backend("corrupt content stream".to_owned()));
            }
            Ok(RgbaImage::new(viewport.width_px, viewport.height_px))
        }

        async fn text_content(&self) -> Result<Vec<TextItem>, PdfEngineError> {
            Ok(Vec::new())
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.events.borrow_mut().push(format!("release {}", self.page_number));
            }
        }

        fn is_released(&self) -> bool {
            self.released
        }
    }

    fn settings() -> RenderSettings {
        RenderSettings { scale: 1.0, ..RenderSettings::default() }
    }

    fn image_widths(surface: &DisplayList) -> Vec<u32> {
        surface
            .commands()
            .iter()
            .filter_map(|command| match command {
                DrawCommand::DrawImage { width, .. } => Some(*width),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn later_page_wins_when_loads_overlap() {
        let (open_first, gate) = oneshot::channel();
        let rasterizer = GatedRasterizer::new(3).gate(1, gate);
        let events = Rc::clone(&rasterizer.events);
        let coordinator = RenderCoordinator::new(rasterizer, DisplayList::default(), settings());
        let annotations = AnnotationSet::new();

        let (first, second) = block_on(async {
            join!(coordinator.load_page(1, &annotations), async {
                let outcome = coordinator.load_page(2, &annotations).await;
                let _ = open_first.send(());
                outcome
            })
        });

        assert!(matches!(first, Ok(LoadOutcome::Superseded)));
        assert!(matches!(second, Ok(LoadOutcome::Rendered(_))));
        assert_eq!(coordinator.current_page(), Some(2));
        assert_eq!(coordinator.phase(), RenderPhase::Rendered { page: 2 });
        assert_eq!(image_widths(&coordinator.surface()), vec![200]);
        assert_eq!(
            *events.borrow(),
            vec!["acquire 2".to_owned(), "acquire 1".to_owned(), "release 1".to_owned()]
        );
    }

    #[test]
    fn previous_page_is_released_before_the_next_is_acquired() {
        let rasterizer = GatedRasterizer::new(2);
        let events = Rc::clone(&rasterizer.events);
        let coordinator = RenderCoordinator::new(rasterizer, DisplayList::default(), settings());
        let annotations = AnnotationSet::new();

        block_on(coordinator.load_page(1, &annotations)).expect("page 1 should load");
        block_on(coordinator.load_page(2, &annotations)).expect("page 2 should load");

        assert_eq!(
            *events.borrow(),
            vec!["acquire 1".to_owned(), "release 1".to_owned(), "acquire 2".to_owned()]
        );
        assert!(coordinator.has_live_page());
    }

    #[test]
    fn failed_render_keeps_previous_page_on_screen() {
        let rasterizer = GatedRasterizer::new(3).failing_render(3);
        let coordinator = RenderCoordinator::new(rasterizer, DisplayList::default(), settings());
        let annotations = AnnotationSet::new();

        block_on(coordinator.load_page(1, &annotations)).expect("page 1 should load");
        let error = block_on(coordinator.load_page(3, &annotations))
            .expect_err("page 3 render should fail");

        assert!(matches!(error, ViewerError::Render { page: 3, .. }));
        assert!(!error.is_cancellation());
        assert_eq!(coordinator.current_page(), Some(1));
        assert_eq!(coordinator.phase(), RenderPhase::Rendered { page: 1 });
        assert_eq!(image_widths(&coordinator.surface()), vec![100]);
    }

    #[test]
    fn text_layout_reacquires_the_page_kept_after_a_failed_load() {
        let rasterizer = GatedRasterizer::new(3).failing_render(3);
        let events = Rc::clone(&rasterizer.events);
        let coordinator = RenderCoordinator::new(rasterizer, DisplayList::default(), settings());
        let annotations = AnnotationSet::new();

        block_on(coordinator.load_page(1, &annotations)).expect("page 1 should load");
        block_on(coordinator.load_page(3, &annotations)).expect_err("page 3 render should fail");
        assert!(!coordinator.has_live_page());

        let items = block_on(coordinator.text_layout()).expect("page 1 is still displayed");

        assert!(items.is_empty());
        assert!(coordinator.has_live_page());
        assert_eq!(events.borrow().last().map(String::as_str), Some("acquire 1"));

        block_on(coordinator.load_page(2, &annotations)).expect("page 2 should load");
        let log = events.borrow();
        assert_eq!(
            log[log.len() - 3..].to_vec(),
            vec!["acquire 1".to_owned(), "release 1".to_owned(), "acquire 2".to_owned()]
        );
    }

    #[test]
    fn text_layout_without_a_displayed_page_is_no_document() {
        let coordinator =
            RenderCoordinator::new(GatedRasterizer::new(1), DisplayList::default(), settings());

        let error = block_on(coordinator.text_layout()).expect_err("nothing is displayed");
        assert!(matches!(error, ViewerError::NoDocument));
    }

    #[test]
    fn out_of_range_pages_are_rejected_without_touching_state() {
        let coordinator =
            RenderCoordinator::new(GatedRasterizer::new(2), DisplayList::default(), settings());

        let error = block_on(coordinator.load_page(3, &AnnotationSet::new()))
            .expect_err("page 3 does not exist");

        assert!(matches!(error, ViewerError::PageOutOfRange { page: 3, page_count: 2 }));
        assert_eq!(coordinator.phase(), RenderPhase::Idle);
    }

    #[test]
    fn repaint_draws_only_current_page_annotations_in_order() {
        let coordinator =
            RenderCoordinator::new(GatedRasterizer::new(2), DisplayList::default(), settings());
        let note = |page: u32, text: &str| Annotation::TextNote {
            page,
            position: Point::new(1.0, 1.0),
            text: text.to_owned(),
            color: Color::BLACK,
        };
        let annotations: AnnotationSet =
            [note(1, "first"), note(2, "elsewhere"), note(1, "second")].into_iter().collect();

        block_on(coordinator.load_page(1, &annotations)).expect("page 1 should load");
        coordinator.repaint(&annotations, None);
        coordinator.repaint(&annotations, None);

        let surface = coordinator.surface();
        assert_eq!(surface.text_runs(), vec!["first", "second"]);
        assert!(matches!(
            surface.commands().first(),
            Some(DrawCommand::FillRect { paint, .. }) if paint.color == Color::WHITE
        ));
        assert_eq!(image_widths(&surface), vec![100]);
    }

    #[test]
    fn close_releases_the_live_page() {
        let rasterizer = GatedRasterizer::new(1);
        let events = Rc::clone(&rasterizer.events);
        let coordinator = RenderCoordinator::new(rasterizer, DisplayList::default(), settings());

        block_on(coordinator.load_page(1, &AnnotationSet::new())).expect("page 1 should load");
        coordinator.close();

        assert!(!coordinator.has_live_page());
        assert_eq!(coordinator.phase(), RenderPhase::Idle);
        assert_eq!(events.borrow().last().map(String::as_str), Some("release 1"));
    }
}
