use std::cell::Cell;

use log::warn;

/// Transient native resources (bitmaps, text pages) are never held across
/// calls, so more than this many live at once points to a leak.
const TRANSIENT_LIVE_LIMIT: usize = 1;

/// Acquisition and release counters for every native resource class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeStats {
    pub heap_allocs: usize,
    pub heap_frees: usize,
    pub bitmaps_created: usize,
    pub bitmaps_destroyed: usize,
    pub text_pages_opened: usize,
    pub text_pages_closed: usize,
    pub pages_loaded: usize,
    pub pages_closed: usize,
    pub documents_loaded: usize,
    pub documents_closed: usize,
}

impl NativeStats {
    #[must_use]
    pub fn live_heap_blocks(&self) -> usize {
        self.heap_allocs.saturating_sub(self.heap_frees)
    }

    #[must_use]
    pub fn live_bitmaps(&self) -> usize {
        self.bitmaps_created.saturating_sub(self.bitmaps_destroyed)
    }

    #[must_use]
    pub fn live_text_pages(&self) -> usize {
        self.text_pages_opened.saturating_sub(self.text_pages_closed)
    }

    #[must_use]
    pub fn live_pages(&self) -> usize {
        self.pages_loaded.saturating_sub(self.pages_closed)
    }

    #[must_use]
    pub fn live_documents(&self) -> usize {
        self.documents_loaded.saturating_sub(self.documents_closed)
    }

    /// True when every acquisition has been paired with a release
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.live_heap_blocks() == 0
            && self.live_bitmaps() == 0
            && self.live_text_pages() == 0
            && self.live_pages() == 0
            && self.live_documents() == 0
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Event {
    HeapAlloc,
    HeapFree,
    BitmapCreate,
    BitmapDestroy,
    TextPageOpen,
    TextPageClose,
    PageLoad,
    PageClose,
    DocumentLoad,
    DocumentClose,
}

/// Per-library recorder. Not global: two libraries never share counters.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    stats: Cell<NativeStats>,
}

impl Recorder {
    pub fn snapshot(&self) -> NativeStats {
        self.stats.get()
    }

    pub fn record(&self, event: Event) {
        let mut stats = self.stats.get();
        let counter = match event {
            Event::HeapAlloc => &mut stats.heap_allocs,
            Event::HeapFree => &mut stats.heap_frees,
            Event::BitmapCreate => &mut stats.bitmaps_created,
            Event::BitmapDestroy => &mut stats.bitmaps_destroyed,
            Event::TextPageOpen => &mut stats.text_pages_opened,
            Event::TextPageClose => &mut stats.text_pages_closed,
            Event::PageLoad => &mut stats.pages_loaded,
            Event::PageClose => &mut stats.pages_closed,
            Event::DocumentLoad => &mut stats.documents_loaded,
            Event::DocumentClose => &mut stats.documents_closed,
        };
        *counter += 1;
        self.stats.set(stats);
        audit_transient(&stats);
    }
}

fn audit_transient(stats: &NativeStats) {
    let bitmaps = stats.live_bitmaps();
    let text_pages = stats.live_text_pages();
    if bitmaps > TRANSIENT_LIVE_LIMIT || text_pages > TRANSIENT_LIVE_LIMIT {
        warn!(
            "Native leak audit warning: live_bitmaps={bitmaps} live_text_pages={text_pages} limit={TRANSIENT_LIVE_LIMIT}"
        );
    }
    if stats.live_documents() > 1 {
        warn!(
            "Native leak audit warning: {} documents resident at once",
            stats.live_documents()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_after_paired_events() {
        let recorder = Recorder::default();
        recorder.record(Event::HeapAlloc);
        recorder.record(Event::BitmapCreate);
        assert!(!recorder.snapshot().is_balanced());
        assert_eq!(recorder.snapshot().live_bitmaps(), 1);

        recorder.record(Event::BitmapDestroy);
        recorder.record(Event::HeapFree);
        let stats = recorder.snapshot();
        assert!(stats.is_balanced());
        assert_eq!(stats.heap_allocs, 1);
        assert_eq!(stats.bitmaps_destroyed, 1);
    }
}
