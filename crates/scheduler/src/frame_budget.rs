//! Frame budget for long-running page loops
//!
//! Apply-all and the background sweep run on the same single-threaded
//! runtime as the host's event handling. A [`FrameBudget`] tracks how long
//! the current slice of work has run and hands control back to the runtime
//! once a frame's worth of time is used up.
//!
//! # Target Frame Times
//! - 60 FPS: 16.67ms per frame
//! - 120 FPS: 8.33ms per frame

use std::time::{Duration, Instant};

/// Default frame budget for 60 FPS displays (16.67ms)
pub const FRAME_BUDGET_60FPS: Duration = Duration::from_micros(16_667);

/// Frame budget for 120 FPS displays (8.33ms)
pub const FRAME_BUDGET_120FPS: Duration = Duration::from_micros(8_333);

/// Time left over for the host's own event processing (5ms)
pub const EVENT_PROCESSING_RESERVE: Duration = Duration::from_millis(5);

/// Elapsed-time tracker for one slice of cooperative work
///
/// # Example
///
/// ```
/// use page_editor_scheduler::frame_budget::FrameBudget;
///
/// # async fn process(pages: &[u32]) {
/// let mut budget = FrameBudget::for_60fps();
/// for _page in pages {
///     // ... render one page ...
///     budget.checkpoint().await;
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FrameBudget {
    slice_start: Instant,
    budget: Duration,
    reserved: Duration,
    yields: u32,
}

impl FrameBudget {
    pub fn new(budget: Duration) -> Self {
        Self {
            slice_start: Instant::now(),
            budget,
            reserved: EVENT_PROCESSING_RESERVE,
            yields: 0,
        }
    }

    pub fn for_60fps() -> Self {
        Self::new(FRAME_BUDGET_60FPS)
    }

    pub fn for_120fps() -> Self {
        Self::new(FRAME_BUDGET_120FPS)
    }

    pub fn with_reserved(mut self, reserved: Duration) -> Self {
        self.reserved = reserved;
        self
    }

    /// Start a new slice
    pub fn reset(&mut self) {
        self.slice_start = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.slice_start.elapsed()
    }

    /// Time left in this slice, `Duration::ZERO` once exceeded
    pub fn remaining(&self) -> Duration {
        self.available().saturating_sub(self.elapsed())
    }

    /// Budget minus the event-processing reserve
    pub fn available(&self) -> Duration {
        self.budget.saturating_sub(self.reserved)
    }

    pub fn is_exceeded(&self) -> bool {
        self.remaining() == Duration::ZERO
    }

    /// Yield to the runtime if the slice is used up
    ///
    /// Returns `true` when it yielded; the next slice starts afterwards.
    pub async fn checkpoint(&mut self) -> bool {
        if !self.is_exceeded() {
            return false;
        }
        tokio::task::yield_now().await;
        self.yields += 1;
        self.reset();
        true
    }

    /// Number of times [`FrameBudget::checkpoint`] yielded
    pub fn yields(&self) -> u32 {
        self.yields
    }
}

impl Default for FrameBudget {
    fn default() -> Self {
        Self::for_60fps()
    }
}
