//! Pointer-driven text selection over rendered pages

use log::{debug, warn};

use super::coords;
use super::error::PdfError;
use super::page::Page;
use super::selection::{SelectionBounds, SelectionRect, TextSelection, group_rects, ordered};
use super::types::{CharacterBounds, ClientRect, PageSize, Point};
use crate::settings::SelectionSettings;

/// Character-level queries the selection engine needs from a page
pub trait CharacterSource {
    fn page_size(&self) -> PageSize;

    /// Character under `point` (page units, top-left origin)
    fn character_at(&self, point: Point) -> Result<Option<usize>, PdfError>;

    /// Bounds of `start..=end`, `None` for non-drawable characters
    fn bounds_in_range(
        &self,
        start: usize,
        end: usize,
    ) -> Result<Vec<Option<CharacterBounds>>, PdfError>;

    fn text_range(&self, start: usize, end: usize) -> Result<String, PdfError>;
}

impl CharacterSource for Page {
    fn page_size(&self) -> PageSize {
        self.size()
    }

    fn character_at(&self, point: Point) -> Result<Option<usize>, PdfError> {
        Page::character_at(self, point)
    }

    fn bounds_in_range(
        &self,
        start: usize,
        end: usize,
    ) -> Result<Vec<Option<CharacterBounds>>, PdfError> {
        Page::bounds_in_range(self, start, end)
    }

    fn text_range(&self, start: usize, end: usize) -> Result<String, PdfError> {
        Page::text_range(self, start, end)
    }
}

/// Lookup of loaded pages by 0-based index
pub trait PageSource {
    fn character_source(&self, page_index: usize) -> Option<&dyn CharacterSource>;
}

/// A pointer event on a page's canvas
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    /// 0-based page index
    pub page_index: usize,
    /// Pointer position in client coordinates
    pub client: Point,
    /// On-screen rectangle of the page canvas
    pub rect: ClientRect,
    pub shift: bool,
}

impl PointerEvent {
    #[must_use]
    pub fn new(page_index: usize, client: Point, rect: ClientRect) -> Self {
        Self {
            page_index,
            client,
            rect,
            shift: false,
        }
    }

    #[must_use]
    pub fn with_shift(mut self, shift: bool) -> Self {
        self.shift = shift;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionState {
    #[default]
    Idle,
    Anchoring,
    Dragging,
    Finalizing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Anchor {
    page: usize,
    index: usize,
}

/// Turns mouse-down, move, up and click events into a [`TextSelection`].
///
/// Selections never span pages. While dragging only the highlight
/// rectangles are recomputed; the text is fetched once on mouse-up.
#[derive(Debug, Default)]
pub struct SelectionEngine {
    tuning: SelectionSettings,
    state: SelectionState,
    selection: Option<TextSelection>,
    anchor: Option<Anchor>,
    shift_selecting: bool,
    just_finished: bool,
}

impl SelectionEngine {
    #[must_use]
    pub fn new(tuning: SelectionSettings) -> Self {
        Self {
            tuning,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn state(&self) -> SelectionState {
        self.state
    }

    #[must_use]
    pub fn selection(&self) -> Option<&TextSelection> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn is_selecting(&self) -> bool {
        matches!(
            self.state,
            SelectionState::Anchoring | SelectionState::Dragging
        )
    }

    /// Drops the selection and the anchor
    pub fn clear(&mut self) {
        self.state = SelectionState::Idle;
        self.selection = None;
        self.anchor = None;
        self.shift_selecting = false;
    }

    pub fn mouse_down(
        &mut self,
        pages: &dyn PageSource,
        event: &PointerEvent,
    ) -> Result<(), PdfError> {
        let Some(source) = pages.character_source(event.page_index) else {
            self.clear();
            return Ok(());
        };
        let Some(index) = hit_test(source, event)? else {
            debug!("Mouse down missed text on page {}", event.page_index);
            self.clear();
            return Ok(());
        };

        match self.anchor {
            Some(anchor) if event.shift && anchor.page == event.page_index => {
                let mut selection = TextSelection::collapsed(anchor.page, anchor.index);
                selection.end_index = index;
                selection.bounds = self.visual_bounds(source, anchor.index, index)?;
                self.selection = Some(selection);
                self.shift_selecting = true;
                self.state = SelectionState::Dragging;
            }
            _ => {
                self.anchor = Some(Anchor {
                    page: event.page_index,
                    index,
                });
                self.selection = Some(TextSelection::collapsed(event.page_index, index));
                self.shift_selecting = false;
                self.state = SelectionState::Anchoring;
            }
        }
        self.just_finished = false;
        Ok(())
    }

    /// Moves the end of an in-progress drag. Only the highlight is updated.
    pub fn mouse_move(
        &mut self,
        pages: &dyn PageSource,
        event: &PointerEvent,
    ) -> Result<(), PdfError> {
        if !self.is_selecting() || self.shift_selecting {
            return Ok(());
        }
        let Some(anchor) = self.anchor else {
            return Ok(());
        };
        if event.page_index != anchor.page {
            return Ok(());
        }
        let Some(source) = pages.character_source(event.page_index) else {
            return Ok(());
        };
        let Some(index) = hit_test(source, event)? else {
            return Ok(());
        };

        let bounds = self.visual_bounds(source, anchor.index, index)?;
        if let Some(selection) = self.selection.as_mut() {
            selection.end_index = index;
            selection.bounds = bounds;
        }
        self.state = SelectionState::Dragging;
        Ok(())
    }

    /// Finalizes the selection: indices are normalized and the text and
    /// rectangles are fetched once.
    pub fn mouse_up(&mut self, pages: &dyn PageSource) -> Result<Option<TextSelection>, PdfError> {
        if !self.is_selecting() {
            return Ok(None);
        }
        self.state = SelectionState::Finalizing;
        let Some(mut selection) = self.selection.take() else {
            self.clear();
            return Ok(None);
        };
        let Some(source) = pages.character_source(selection.start_page) else {
            warn!(
                "Page {} unloaded before selection finished",
                selection.start_page
            );
            self.clear();
            return Ok(None);
        };

        let (start, end) = selection.ordered_indices();
        let finalized = source
            .text_range(start, end)
            .and_then(|text| Ok((text, self.visual_bounds(source, start, end)?)));
        let (text, bounds) = match finalized {
            Ok(parts) => parts,
            Err(e) => {
                self.clear();
                return Err(e);
            }
        };

        selection.start_index = start;
        selection.end_index = end;
        selection.text = text;
        selection.bounds = bounds;
        debug!(
            "Selected {}..={} on page {}: {} chars",
            start,
            end,
            selection.start_page,
            selection.text.chars().count()
        );

        self.selection = Some(selection.clone());
        self.shift_selecting = false;
        self.just_finished = true;
        self.state = SelectionState::Idle;
        Ok(Some(selection))
    }

    /// A click that directly follows a finished drag keeps the selection;
    /// any other click outside a drag clears it.
    pub fn click(&mut self) {
        if self.just_finished {
            self.just_finished = false;
            return;
        }
        if !self.is_selecting() {
            self.clear();
        }
    }

    fn visual_bounds(
        &self,
        source: &dyn CharacterSource,
        a: usize,
        b: usize,
    ) -> Result<SelectionBounds, PdfError> {
        let (start, end) = ordered(a, b);
        let bounds: Vec<CharacterBounds> = source
            .bounds_in_range(start, end)?
            .into_iter()
            .flatten()
            .collect();
        let rects: Vec<SelectionRect> = group_rects(&bounds, &self.tuning);
        Ok(SelectionBounds { rects })
    }
}

fn hit_test(source: &dyn CharacterSource, event: &PointerEvent) -> Result<Option<usize>, PdfError> {
    match coords::client_to_page(event.client, event.rect, source.page_size()) {
        Some(point) => source.character_at(point),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLYPH_WIDTH: f64 = 10.0;
    const TOP: f64 = 100.0;
    const BOTTOM: f64 = 112.0;

    /// One line of text, one glyph every 10 units starting at x = 0
    struct FakePage {
        text: Vec<char>,
    }

    impl FakePage {
        fn new(text: &str) -> Self {
            Self {
                text: text.chars().collect(),
            }
        }
    }

    impl CharacterSource for FakePage {
        fn page_size(&self) -> PageSize {
            PageSize::new(612.0, 792.0)
        }

        fn character_at(&self, point: Point) -> Result<Option<usize>, PdfError> {
            if point.y < TOP || point.y > BOTTOM || point.x < 0.0 {
                return Ok(None);
            }
            let index = (point.x / GLYPH_WIDTH) as usize;
            Ok((index < self.text.len()).then_some(index))
        }

        fn bounds_in_range(
            &self,
            start: usize,
            end: usize,
        ) -> Result<Vec<Option<CharacterBounds>>, PdfError> {
            Ok((start..=end.min(self.text.len() - 1))
                .map(|i| {
                    (!self.text[i].is_whitespace()).then(|| CharacterBounds {
                        left: i as f64 * GLYPH_WIDTH + 1.0,
                        right: i as f64 * GLYPH_WIDTH + 9.0,
                        top: TOP,
                        bottom: BOTTOM,
                        line_height: 14.4,
                    })
                })
                .collect())
        }

        fn text_range(&self, start: usize, end: usize) -> Result<String, PdfError> {
            Ok(self.text[start..=end.min(self.text.len() - 1)].iter().collect())
        }
    }

    struct FakeDocument(Vec<FakePage>);

    impl PageSource for FakeDocument {
        fn character_source(&self, page_index: usize) -> Option<&dyn CharacterSource> {
            self.0.get(page_index).map(|p| p as &dyn CharacterSource)
        }
    }

    fn document() -> FakeDocument {
        FakeDocument(vec![FakePage::new("Hello World"), FakePage::new("Second page")])
    }

    fn at(page: usize, index: usize) -> PointerEvent {
        PointerEvent::new(
            page,
            Point::new(index as f64 * GLYPH_WIDTH + 5.0, 106.0),
            ClientRect::new(0.0, 0.0, 612.0, 792.0),
        )
    }

    fn drag(engine: &mut SelectionEngine, doc: &FakeDocument, from: usize, to: usize) -> TextSelection {
        engine.mouse_down(doc, &at(0, from)).unwrap();
        engine.mouse_move(doc, &at(0, to)).unwrap();
        engine.mouse_up(doc).unwrap().unwrap()
    }

    #[test]
    fn state_machine_walks_through_a_drag() {
        let doc = document();
        let mut engine = SelectionEngine::default();
        assert_eq!(engine.state(), SelectionState::Idle);
        engine.mouse_down(&doc, &at(0, 0)).unwrap();
        assert_eq!(engine.state(), SelectionState::Anchoring);
        engine.mouse_move(&doc, &at(0, 4)).unwrap();
        assert_eq!(engine.state(), SelectionState::Dragging);
        assert!(engine.selection().unwrap().text.is_empty());
        assert!(!engine.selection().unwrap().bounds.rects.is_empty());

        let selection = engine.mouse_up(&doc).unwrap().unwrap();
        assert_eq!(engine.state(), SelectionState::Idle);
        assert_eq!(selection.text, "Hello");
    }

    #[test]
    fn reverse_drag_matches_forward_drag() {
        let doc = document();
        let forward = drag(&mut SelectionEngine::default(), &doc, 2, 8);
        let reverse = drag(&mut SelectionEngine::default(), &doc, 8, 2);
        assert_eq!(forward, reverse);
        assert_eq!(forward.text, "llo Wor");
        assert_eq!((forward.start_index, forward.end_index), (2, 8));
    }

    #[test]
    fn space_splits_highlight_rects() {
        let doc = document();
        let selection = drag(&mut SelectionEngine::default(), &doc, 0, 10);
        // word gap across the space is 12 units: above merge, below line break
        assert_eq!(selection.bounds.rects.len(), 2);
    }

    #[test]
    fn shift_click_extends_from_anchor() {
        let doc = document();
        let mut engine = SelectionEngine::default();
        drag(&mut engine, &doc, 1, 3);
        engine.click();

        engine.mouse_down(&doc, &at(0, 7).with_shift(true)).unwrap();
        // moves are ignored while shift-selecting
        engine.mouse_move(&doc, &at(0, 9)).unwrap();
        let selection = engine.mouse_up(&doc).unwrap().unwrap();
        assert_eq!(selection.text, "ello W");
    }

    #[test]
    fn miss_clears_selection() {
        let doc = document();
        let mut engine = SelectionEngine::default();
        drag(&mut engine, &doc, 0, 4);
        let mut miss = at(0, 0);
        miss.client.y = 500.0;
        engine.mouse_down(&doc, &miss).unwrap();
        assert!(engine.selection().is_none());
        assert_eq!(engine.state(), SelectionState::Idle);
    }

    #[test]
    fn moves_on_other_pages_are_ignored() {
        let doc = document();
        let mut engine = SelectionEngine::default();
        engine.mouse_down(&doc, &at(0, 0)).unwrap();
        engine.mouse_move(&doc, &at(1, 6)).unwrap();
        let selection = engine.mouse_up(&doc).unwrap().unwrap();
        assert_eq!(selection.start_page, 0);
        assert_eq!(selection.text, "H");
    }

    #[test]
    fn click_after_finish_keeps_selection_once() {
        let doc = document();
        let mut engine = SelectionEngine::default();
        drag(&mut engine, &doc, 0, 4);
        engine.click();
        assert!(engine.selection().is_some());
        engine.click();
        assert!(engine.selection().is_none());
    }

    #[test]
    fn mouse_up_without_drag_is_noop() {
        let doc = document();
        let mut engine = SelectionEngine::default();
        assert!(engine.mouse_up(&doc).unwrap().is_none());
    }

    #[test]
    fn client_rect_scaling_is_applied() {
        let doc = document();
        let mut engine = SelectionEngine::default();
        // page shown at 2x, offset by the canvas position
        let rect = ClientRect::new(50.0, 20.0, 1224.0, 1584.0);
        let event = PointerEvent::new(0, Point::new(50.0 + 65.0 * 2.0, 20.0 + 106.0 * 2.0), rect);
        engine.mouse_down(&doc, &event).unwrap();
        assert_eq!(engine.selection().unwrap().start_index, 6);
    }
}
