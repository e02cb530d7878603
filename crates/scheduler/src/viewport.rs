//! Viewport visibility port
//!
//! The host reports what scrolled into view through a [`VisibilityPort`];
//! the scheduler drains the matching [`VisibilityEvents`]. The two halves are
//! a plain channel, so the scheduler never reaches into host UI state.

use tokio::sync::mpsc;

/// Something the host reports as visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// A single page, 1-based
    Page(u32),

    /// A two-up sheet; both constituent pages load together
    Sheet(u32, u32),
}

impl Visibility {
    /// Constituent pages, in display order
    pub fn pages(&self) -> Vec<u32> {
        match *self {
            Visibility::Page(page) => vec![page],
            Visibility::Sheet(left, right) if left == right => vec![left],
            Visibility::Sheet(left, right) => vec![left, right],
        }
    }
}

/// Host-side sender
///
/// Cheap to clone. Dropping every clone ends the scheduler's visibility loop.
#[derive(Debug, Clone)]
pub struct VisibilityPort {
    tx: mpsc::UnboundedSender<Visibility>,
}

impl VisibilityPort {
    /// Report a page as visible
    ///
    /// Returns `false` once the scheduler has gone away.
    pub fn page_visible(&self, page: u32) -> bool {
        self.tx.send(Visibility::Page(page)).is_ok()
    }

    /// Report a two-up sheet as visible
    pub fn sheet_visible(&self, left: u32, right: u32) -> bool {
        self.tx.send(Visibility::Sheet(left, right)).is_ok()
    }
}

/// Scheduler-side receiver
#[derive(Debug)]
pub struct VisibilityEvents {
    rx: mpsc::UnboundedReceiver<Visibility>,
}

impl VisibilityEvents {
    /// Next event, or `None` once every port is dropped
    pub async fn next(&mut self) -> Option<Visibility> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_next(&mut self) -> Option<Visibility> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected port/events pair
pub fn visibility_channel() -> (VisibilityPort, VisibilityEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (VisibilityPort { tx }, VisibilityEvents { rx })
}

/// The first `pages` pages belong to the sweep until it completes
///
/// Viewport triggers for those pages are ignored while the sweep owns them,
/// which keeps the two loaders from racing on the pages visible at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EagerWindow {
    pages: u32,
}

impl EagerWindow {
    pub fn new(pages: u32) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// May a viewport trigger load `page` right now?
    pub fn admits(&self, page: u32, sweep_complete: bool) -> bool {
        sweep_complete || page > self.pages
    }
}

impl Default for EagerWindow {
    fn default() -> Self {
        Self::new(5)
    }
}
