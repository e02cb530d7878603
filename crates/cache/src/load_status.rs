//! Per-page load status
//!
//! The single coordination point for every loader. A page moves
//! Idle → Loading → Loaded, or Loading → Failed; a Failed page may be tried
//! again. Only one caller can hold a page in Loading at a time, which is what
//! keeps the sweep, viewport and on-demand paths from rendering it twice.

use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// Counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCounts {
    pub loading: usize,
    pub loaded: usize,
    pub failed: usize,
}

/// Thread-safe page → [`LoadStatus`] map
///
/// Absent pages are Idle.
#[derive(Debug, Default)]
pub struct LoadStatusMap {
    pages: Mutex<BTreeMap<u32, LoadStatus>>,
}

impl LoadStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `page` for loading
    ///
    /// Succeeds from Idle or Failed. Returns `false` when the page is already
    /// Loading or Loaded; the caller must then skip it.
    pub fn try_begin(&self, page: u32) -> bool {
        let mut pages = self.pages.lock();
        match pages.get(&page) {
            Some(LoadStatus::Loading) | Some(LoadStatus::Loaded) => false,
            _ => {
                pages.insert(page, LoadStatus::Loading);
                true
            }
        }
    }

    /// Still held in Loading, i.e. nobody rolled it back or reset it
    pub fn is_loading(&self, page: u32) -> bool {
        matches!(self.pages.lock().get(&page), Some(LoadStatus::Loading))
    }

    /// Loading → Loaded
    pub fn finish(&self, page: u32) -> bool {
        self.transition(page, LoadStatus::Loaded)
    }

    /// Loading → Failed
    pub fn fail(&self, page: u32, reason: impl Into<String>) -> bool {
        self.transition(page, LoadStatus::Failed(reason.into()))
    }

    /// Loading → Idle, after cancellation
    pub fn rollback(&self, page: u32) -> bool {
        let mut pages = self.pages.lock();
        if matches!(pages.get(&page), Some(LoadStatus::Loading)) {
            pages.remove(&page);
            true
        } else {
            false
        }
    }

    fn transition(&self, page: u32, next: LoadStatus) -> bool {
        let mut pages = self.pages.lock();
        match pages.get_mut(&page) {
            Some(status @ LoadStatus::Loading) => {
                *status = next;
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, page: u32) -> LoadStatus {
        self.pages.lock().get(&page).cloned().unwrap_or_default()
    }

    /// Failed pages in ascending order, ready for retry
    pub fn failed_pages(&self) -> Vec<u32> {
        self.pages_where(|status| matches!(status, LoadStatus::Failed(_)))
    }

    pub fn loaded_pages(&self) -> Vec<u32> {
        self.pages_where(|status| *status == LoadStatus::Loaded)
    }

    fn pages_where(&self, predicate: impl Fn(&LoadStatus) -> bool) -> Vec<u32> {
        self.pages
            .lock()
            .iter()
            .filter(|(_, status)| predicate(status))
            .map(|(page, _)| *page)
            .collect()
    }

    pub fn counts(&self) -> LoadCounts {
        let pages = self.pages.lock();
        let mut counts = LoadCounts::default();
        for status in pages.values() {
            match status {
                LoadStatus::Idle => {}
                LoadStatus::Loading => counts.loading += 1,
                LoadStatus::Loaded => counts.loaded += 1,
                LoadStatus::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    /// Forget everything, e.g. on document reload
    pub fn clear(&self) {
        self.pages.lock().clear();
    }
}
