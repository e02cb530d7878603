//! Progressive page scheduler
//!
//! Drives the three loading paths that feed a document's pages:
//!
//! 1. the requested page, rendered before `open` returns,
//! 2. the background sweep over every other page,
//! 3. viewport triggers arriving through [`VisibilityEvents`],
//!
//! plus on-demand requests from the host. All of them call the same
//! [`PageLoader`], which is where per-page deduplication lives. The scheduler
//! only decides order and pacing.

use crate::cancel::CancellationToken;
use crate::order::sweep_order;
use crate::viewport::{EagerWindow, Visibility, VisibilityEvents};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Which path asked for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOrigin {
    Requested,
    Sweep,
    Viewport,
    OnDemand,
}

/// Result of one load attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Rendered and published by this call
    Loaded,
    /// Already loaded or loading elsewhere; nothing done
    Skipped,
    /// Render failed; the page is eligible for retry
    Failed(String),
    /// The file token was cancelled; nothing was published
    Cancelled,
}

/// Renders and publishes one page
///
/// Implementations must consult their load-status map so that concurrent
/// calls for the same page produce exactly one render.
pub trait PageLoader {
    fn page_count(&self) -> u32;

    fn load_page(&self, page: u32, origin: LoadOrigin) -> impl Future<Output = LoadOutcome>;
}

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Loads handed to the loader
    pub loads_started: u64,

    /// Loads that rendered and published
    pub loads_completed: u64,

    /// Loads skipped because the page was already handled
    pub loads_skipped: u64,

    /// Viewport triggers ignored because the sweep still owned the page
    pub loads_deferred: u64,

    pub loads_failed: u64,

    pub loads_cancelled: u64,
}

impl SchedulerStats {
    fn record(&mut self, outcome: &LoadOutcome) {
        match outcome {
            LoadOutcome::Loaded => self.loads_completed += 1,
            LoadOutcome::Skipped => self.loads_skipped += 1,
            LoadOutcome::Failed(_) => self.loads_failed += 1,
            LoadOutcome::Cancelled => self.loads_cancelled += 1,
        }
    }
}

/// Orders and paces page loads for one open document
///
/// # Example
///
/// ```no_run
/// use page_editor_scheduler::{
///     visibility_channel, CancellationToken, LoadOrigin, LoadOutcome, PageLoader,
///     ProgressiveScheduler,
/// };
///
/// struct Pages(u32);
///
/// impl PageLoader for Pages {
///     fn page_count(&self) -> u32 {
///         self.0
///     }
///
///     async fn load_page(&self, _page: u32, _origin: LoadOrigin) -> LoadOutcome {
///         LoadOutcome::Loaded
///     }
/// }
///
/// # async fn run() {
/// let scheduler = ProgressiveScheduler::new(Pages(10), CancellationToken::new());
/// let (port, mut events) = visibility_channel();
///
/// scheduler.open(1).await;
/// port.page_visible(8);
/// drop(port);
/// tokio::join!(scheduler.run_sweep(1), scheduler.serve_visibility(&mut events));
/// assert!(scheduler.is_sweep_complete());
/// # }
/// ```
pub struct ProgressiveScheduler<L> {
    loader: L,
    token: CancellationToken,
    window: EagerWindow,
    idle_delay: Duration,
    sweep_complete: AtomicBool,
    stats: Mutex<SchedulerStats>,
}

impl<L: PageLoader> ProgressiveScheduler<L> {
    pub fn new(loader: L, token: CancellationToken) -> Self {
        Self {
            loader,
            token,
            window: EagerWindow::default(),
            idle_delay: Duration::ZERO,
            sweep_complete: AtomicBool::new(false),
            stats: Mutex::new(SchedulerStats::default()),
        }
    }

    /// Number of leading pages reserved for the sweep
    pub fn with_eager_pages(mut self, pages: u32) -> Self {
        self.window = EagerWindow::new(pages);
        self
    }

    /// Extra pause between sweep pages, on top of the runtime yield
    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_sweep_complete(&self) -> bool {
        self.sweep_complete.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.lock().clone()
    }

    /// Render the requested page; the document is "ready" once this returns
    pub async fn open(&self, requested: u32) -> LoadOutcome {
        let page = requested.clamp(1, self.loader.page_count().max(1));
        self.load(page, LoadOrigin::Requested).await
    }

    /// Render every other page, neighbours of `requested` first
    ///
    /// One page at a time with a yield in between. Sets the sweep-complete
    /// flag when the queue runs dry; a cancelled token stops the sweep early
    /// and leaves the flag unset.
    pub async fn run_sweep(&self, requested: u32) {
        let order = sweep_order(requested, self.loader.page_count());
        tracing::debug!(requested, queued = order.len(), "starting background sweep");

        for page in order {
            if self.token.is_cancelled() {
                tracing::debug!(page, "sweep stopped by cancellation");
                return;
            }
            tokio::task::yield_now().await;
            if !self.idle_delay.is_zero() {
                tokio::time::sleep(self.idle_delay).await;
            }
            self.load(page, LoadOrigin::Sweep).await;
        }

        if !self.token.is_cancelled() {
            self.sweep_complete.store(true, Ordering::Release);
            tracing::info!(pages = self.loader.page_count(), "background sweep complete");
        }
    }

    /// Handle one visibility report
    ///
    /// Pages inside the eager window are deferred until the sweep completes.
    /// Out-of-range pages are ignored.
    pub async fn on_visible(&self, visibility: Visibility) -> Vec<(u32, LoadOutcome)> {
        let page_count = self.loader.page_count();
        let mut outcomes = Vec::new();

        for page in visibility.pages() {
            if page == 0 || page > page_count {
                continue;
            }
            if !self.window.admits(page, self.is_sweep_complete()) {
                self.stats.lock().loads_deferred += 1;
                tracing::debug!(page, "viewport trigger deferred to sweep");
                continue;
            }
            let outcome = self.load(page, LoadOrigin::Viewport).await;
            outcomes.push((page, outcome));
        }
        outcomes
    }

    /// Serve visibility reports until the port closes or the token is cancelled
    pub async fn serve_visibility(&self, events: &mut VisibilityEvents) {
        loop {
            let visibility = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                event = events.next() => match event {
                    Some(visibility) => visibility,
                    None => break,
                },
            };
            self.on_visible(visibility).await;
        }
        tracing::debug!("visibility loop finished");
    }

    /// Load a page on demand, regardless of sweep state
    pub async fn request(&self, page: u32) -> LoadOutcome {
        self.load(page, LoadOrigin::OnDemand).await
    }

    async fn load(&self, page: u32, origin: LoadOrigin) -> LoadOutcome {
        if self.token.is_cancelled() {
            self.stats.lock().record(&LoadOutcome::Cancelled);
            return LoadOutcome::Cancelled;
        }

        self.stats.lock().loads_started += 1;
        let outcome = self.loader.load_page(page, origin).await;

        match &outcome {
            LoadOutcome::Loaded => tracing::debug!(page, origin = ?origin, "page loaded"),
            LoadOutcome::Skipped => tracing::trace!(page, origin = ?origin, "page already handled"),
            LoadOutcome::Failed(error) => {
                tracing::warn!(page, origin = ?origin, error = %error, "page failed to load")
            }
            LoadOutcome::Cancelled => tracing::debug!(page, origin = ?origin, "page load cancelled"),
        }

        self.stats.lock().record(&outcome);
        outcome
    }
}
