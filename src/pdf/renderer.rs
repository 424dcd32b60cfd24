//! Lazy page loading and rendering for a scrolling document view

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use image::RgbaImage;
use log::{debug, error};

use super::document::Document;
use super::error::PdfError;
use super::page::Page;
use super::selection::{HIGHLIGHT, TextSelection, paint_highlights};
use super::selection_engine::{CharacterSource, PageSource};
use super::surface::{Canvas, DrawingSurface, WHITE};
use super::types::PageSize;
use super::viewport::{RenderMode, Viewport};
use crate::settings::RendererSettings;

/// Commands that modify renderer state. Pages are 0-based.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// A page scrolled into or out of view
    SetVisible { page: usize, visible: bool },
    /// Set the zoom factor
    SetScale(f64),
    SetRenderMode(RenderMode),
    SetDevicePixelRatio(f64),
    /// The page's view is going away
    Unmount(usize),
    UnmountAll,
}

/// Effects produced by state changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Load the native page
    LoadPage(usize),
    /// Render the page into its surface
    RenderPage(usize),
    /// Close the native page
    DestroyPage(usize),
}

/// Per-page view state
pub struct PageView<S> {
    page: Option<Page>,
    surface: S,
    visible: bool,
    /// A load has been requested and not undone
    loaded: bool,
    /// Render settings changed while the page was off screen
    dirty: bool,
    last_error: Option<PdfError>,
}

impl<S: Default> Default for PageView<S> {
    fn default() -> Self {
        Self {
            page: None,
            surface: S::default(),
            visible: false,
            loaded: false,
            dirty: false,
            last_error: None,
        }
    }
}

impl<S> PageView<S> {
    #[must_use]
    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&PdfError> {
        self.last_error.as_ref()
    }
}

/// Renders the pages of one document into per-page surfaces.
///
/// Pages are loaded only once they become visible. Changing scale, render
/// mode or device pixel ratio re-renders loaded pages with their existing
/// native handles. A page that fails to load is left unloaded and hidden,
/// so the next visibility report retries the load.
pub struct PageRenderer<S: DrawingSurface + Default = Canvas> {
    views: Vec<PageView<S>>,
    scale: f64,
    render_mode: RenderMode,
    device_pixel_ratio: f64,
    placeholder: PageSize,
}

impl<S: DrawingSurface + Default> PageRenderer<S> {
    #[must_use]
    pub fn new(page_count: usize, settings: &RendererSettings) -> Self {
        Self {
            views: (0..page_count).map(|_| PageView::default()).collect(),
            scale: 1.0,
            render_mode: RenderMode::default(),
            device_pixel_ratio: settings.device_pixel_ratio,
            placeholder: PageSize::new(settings.placeholder_width, settings.placeholder_height),
        }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.views.len()
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub fn view(&self, page: usize) -> Option<&PageView<S>> {
        self.views.get(page)
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::SetVisible { page, visible } => {
                let Some(view) = self.views.get_mut(page) else {
                    return vec![];
                };
                if view.visible == visible {
                    return vec![];
                }
                view.visible = visible;
                if !visible {
                    vec![]
                } else if !view.loaded {
                    view.loaded = true;
                    view.dirty = false;
                    vec![Effect::LoadPage(page), Effect::RenderPage(page)]
                } else if view.dirty {
                    view.dirty = false;
                    vec![Effect::RenderPage(page)]
                } else {
                    vec![]
                }
            }

            Command::SetScale(scale) => {
                if !scale.is_finite() || scale <= 0.0 || (self.scale - scale).abs() <= f64::EPSILON
                {
                    return vec![];
                }
                self.scale = scale;
                self.invalidate_loaded()
            }

            Command::SetRenderMode(mode) => {
                if self.render_mode == mode {
                    return vec![];
                }
                self.render_mode = mode;
                self.invalidate_loaded()
            }

            Command::SetDevicePixelRatio(ratio) => {
                if !ratio.is_finite()
                    || ratio <= 0.0
                    || (self.device_pixel_ratio - ratio).abs() <= f64::EPSILON
                {
                    return vec![];
                }
                self.device_pixel_ratio = ratio;
                self.invalidate_loaded()
            }

            Command::Unmount(page) => match self.views.get_mut(page) {
                Some(view) if view.loaded => {
                    view.loaded = false;
                    view.visible = false;
                    view.dirty = false;
                    vec![Effect::DestroyPage(page)]
                }
                _ => vec![],
            },

            Command::UnmountAll => (0..self.views.len())
                .flat_map(|page| self.apply(Command::Unmount(page)))
                .collect(),
        }
    }

    /// Visible loaded pages re-render now; hidden ones when they reappear
    fn invalidate_loaded(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        for (page, view) in self.views.iter_mut().enumerate() {
            if !view.loaded {
                continue;
            }
            if view.visible {
                effects.push(Effect::RenderPage(page));
            } else {
                view.dirty = true;
            }
        }
        effects
    }

    /// Executes one effect against `document`
    pub fn perform(&mut self, document: &Document, effect: Effect) -> Result<(), PdfError> {
        match effect {
            Effect::LoadPage(page) => self.load(document, page),
            Effect::RenderPage(page) => self.render(page),
            Effect::DestroyPage(page) => {
                if let Some(view) = self.views.get_mut(page) {
                    if let Some(loaded) = view.page.take() {
                        loaded.destroy();
                    }
                }
                Ok(())
            }
        }
    }

    /// Executes `effects` in order, collecting failures per page
    pub fn drive(&mut self, document: &Document, effects: Vec<Effect>) -> Vec<(usize, PdfError)> {
        let mut failures = Vec::new();
        for effect in effects {
            let page = match effect {
                Effect::LoadPage(p) | Effect::RenderPage(p) | Effect::DestroyPage(p) => p,
            };
            if let Err(e) = self.perform(document, effect) {
                failures.push((page, e));
            }
        }
        failures
    }

    /// Applies a command and performs its effects
    pub fn dispatch(&mut self, document: &Document, cmd: Command) -> Vec<(usize, PdfError)> {
        let effects = self.apply(cmd);
        self.drive(document, effects)
    }

    fn load(&mut self, document: &Document, page: usize) -> Result<(), PdfError> {
        let Some(view) = self.views.get_mut(page) else {
            return Err(PdfError::PageOutOfRange {
                page: page + 1,
                count: self.views.len(),
            });
        };
        if view.page.is_some() {
            return Ok(());
        }
        match document.get_page(page + 1) {
            Ok(loaded) => {
                debug!("Lazily loaded page {}", page + 1);
                view.page = Some(loaded);
                view.last_error = None;
                Ok(())
            }
            Err(e) => {
                error!("Error loading page {}: {e}", page + 1);
                view.loaded = false;
                view.visible = false;
                view.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn render(&mut self, page: usize) -> Result<(), PdfError> {
        let (width, height) = self.pixel_size(page);
        let viewport = Viewport::new(f64::from(width), f64::from(height))
            .with_scale(self.scale)
            .with_render_mode(self.render_mode);
        let Some(view) = self.views.get_mut(page) else {
            return Ok(());
        };
        let Some(loaded) = view.page.as_ref() else {
            return Ok(());
        };

        view.surface.resize(width, height);
        view.surface.clear();
        match loaded.render(&mut view.surface, &viewport) {
            Ok(()) => {
                view.last_error = None;
                Ok(())
            }
            Err(e) => {
                error!("Error rendering page {}: {e}", page + 1);
                view.surface.fill_rect(0, 0, width, height, WHITE);
                view.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn page_size(&self, page: usize) -> PageSize {
        self.views
            .get(page)
            .and_then(|view| view.page.as_ref())
            .map_or(self.placeholder, Page::size)
    }

    /// Device pixels per page unit for the current scale and render mode
    fn pixel_scale(&self) -> f64 {
        self.scale * self.render_mode.pixel_density(self.device_pixel_ratio)
    }

    /// Canvas backing-store size: page size x scale x pixel density of the
    /// render mode
    #[must_use]
    pub fn pixel_size(&self, page: usize) -> (u32, u32) {
        let size = self.page_size(page).scaled(self.pixel_scale());
        (to_pixels(size.width), to_pixels(size.height))
    }

    /// Layout size: page size x scale
    #[must_use]
    pub fn css_size(&self, page: usize) -> (f64, f64) {
        let size = self.page_size(page).scaled(self.scale);
        (size.width, size.height)
    }
}

impl PageRenderer<Canvas> {
    /// The page's rendered pixels with the selection highlight painted on
    /// top. Pages other than the selection's start page come back plain.
    #[must_use]
    pub fn highlighted(&self, page: usize, selection: Option<&TextSelection>) -> Option<RgbaImage> {
        let view = self.views.get(page)?;
        let mut image = view.surface.pixels().clone();
        if let Some(selection) = selection {
            let rects = selection.overlay_rects(page, self.pixel_scale());
            paint_highlights(&mut image, &rects, HIGHLIGHT);
        }
        Some(image)
    }
}

impl<S: DrawingSurface + Default> PageSource for PageRenderer<S> {
    fn character_source(&self, page_index: usize) -> Option<&dyn CharacterSource> {
        self.views
            .get(page_index)
            .and_then(|view| view.page.as_ref())
            .map(|page| page as &dyn CharacterSource)
    }
}

fn to_pixels(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.floor().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

/// Coalesces bursts of visibility changes.
///
/// Only the last reported state per page is kept, and it is released once
/// the page has been quiet for the debounce period.
#[derive(Debug)]
pub struct VisibilityDebouncer {
    quiet: Duration,
    pending: BTreeMap<usize, (bool, Instant)>,
}

impl VisibilityDebouncer {
    #[must_use]
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: BTreeMap::new(),
        }
    }

    pub fn report(&mut self, page: usize, visible: bool, now: Instant) {
        self.pending.insert(page, (visible, now));
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Commands for every page that has been quiet long enough
    pub fn drain_ready(&mut self, now: Instant) -> Vec<Command> {
        let ready: Vec<usize> = self
            .pending
            .iter()
            .filter(|(_, (_, at))| now.saturating_duration_since(*at) >= self.quiet)
            .map(|(page, _)| *page)
            .collect();
        ready
            .into_iter()
            .filter_map(|page| {
                self.pending
                    .remove(&page)
                    .map(|(visible, _)| Command::SetVisible { page, visible })
            })
            .collect()
    }
}
