//! Page engine: one open document
//!
//! The engine ties a parsed [`DocumentSource`] (obtained through the
//! host-owned [`LoaderSession`]) to a progressive scheduler and the page
//! pipeline. The host drives it from a single task:
//!
//! ```no_run
//! use page_editor_cache::LoaderSession;
//! use page_editor_core::{EngineConfig, PageEngine};
//! use page_editor_render::DocumentSource;
//! use page_editor_scheduler::visibility_channel;
//! use std::sync::Arc;
//!
//! # async fn run() -> page_editor_core::EngineResult<()> {
//! let session: Arc<LoaderSession<dyn DocumentSource>> = Arc::new(LoaderSession::new());
//! let engine = PageEngine::open_path(session, "scan.pdf", EngineConfig::default(), 1).await?;
//!
//! let (port, mut events) = visibility_channel();
//! port.page_visible(12);
//! drop(port);
//! engine.run_background(&mut events).await;
//! # Ok(())
//! # }
//! ```

use crate::apply_all::{ApplyAllReport, ApplyAllSnapshot, ApplyAllStage, ProgressCallback, ProgressTracker};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::pdf_export::{export_document, ExportOptions, ExportReport};
use crate::pipeline::PagePipeline;
use page_editor_cache::{
    BeginLoad, ChangeSet, FileIdentity, LoadStatus, LoaderSession, PageNumber, PageRecord, StoreStats,
};
use page_editor_render::{open_document, DocumentSource, EditHistory, RenderResult};
use page_editor_scheduler::{
    CancellationToken, FrameBudget, LoadOutcome, ProgressiveScheduler, SchedulerStats, VisibilityEvents,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub struct PageEngine {
    identity: FileIdentity,
    session: Arc<LoaderSession<dyn DocumentSource>>,
    scheduler: ProgressiveScheduler<PagePipeline>,
    requested: u32,
}

impl PageEngine {
    /// Open a document and render `requested` before returning
    ///
    /// `parse` runs only when no other caller is already parsing (or has
    /// parsed) the same identity; otherwise the existing parse is reused.
    pub async fn open<F>(
        session: Arc<LoaderSession<dyn DocumentSource>>,
        identity: FileIdentity,
        config: EngineConfig,
        requested: u32,
        parse: F,
    ) -> EngineResult<Self>
    where
        F: FnOnce() -> RenderResult<Arc<dyn DocumentSource>>,
    {
        config.validate()?;

        let dropped = session.switch_to(&identity);
        if dropped > 0 {
            tracing::debug!(file = %identity, dropped, "invalidated previous documents");
        }

        let (document, token) = match session.begin_load(&identity) {
            BeginLoad::Started(ticket) => match parse() {
                Ok(document) => {
                    session.complete(&ticket, Arc::clone(&document))?;
                    (document, ticket.token)
                }
                Err(error) => {
                    if let Err(session_error) = session.fail(&ticket, error.to_string()) {
                        tracing::debug!(error = %session_error, "parse failure not recorded");
                    }
                    return Err(EngineError::DocumentParse(error));
                }
            },
            BeginLoad::InFlight(handle) => {
                let token = handle.token().clone();
                (handle.wait().await?, token)
            }
            BeginLoad::Ready { document, token } => (document, token),
        };

        let page_count = document.page_count();
        let requested = requested.clamp(1, page_count.max(1));
        let scheduler = ProgressiveScheduler::new(
            PagePipeline::new(document, token.clone(), config.clone()),
            token,
        )
        .with_eager_pages(config.eager_viewport_pages)
        .with_idle_delay(config.sweep_idle_delay());

        match scheduler.open(requested).await {
            LoadOutcome::Loaded | LoadOutcome::Skipped => {}
            LoadOutcome::Failed(reason) => {
                tracing::warn!(page = requested, error = %reason, "requested page failed; document stays open");
            }
            LoadOutcome::Cancelled => return Err(EngineError::Cancelled),
        }

        tracing::info!(file = %identity, page_count, requested, "document opened");
        Ok(Self {
            identity,
            session,
            scheduler,
            requested,
        })
    }

    /// Open a PDF file with the best available source
    ///
    /// See [`open_document`]: real page content with the `pdfium` feature,
    /// placeholder rasters otherwise.
    pub async fn open_path<P: AsRef<Path>>(
        session: Arc<LoaderSession<dyn DocumentSource>>,
        path: P,
        config: EngineConfig,
        requested: u32,
    ) -> EngineResult<Self> {
        let path = path.as_ref();
        let identity = FileIdentity::from_path(path)?;
        Self::open(session, identity, config, requested, || open_document(path)).await
    }

    pub fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        self.pipeline().config()
    }

    pub fn token(&self) -> &CancellationToken {
        self.scheduler.token()
    }

    pub fn page_count(&self) -> u32 {
        self.pipeline().source().page_count()
    }

    pub fn requested_page(&self) -> u32 {
        self.requested
    }

    pub fn scheduler(&self) -> &ProgressiveScheduler<PagePipeline> {
        &self.scheduler
    }

    pub fn pipeline(&self) -> &PagePipeline {
        self.scheduler.loader()
    }

    /// Sweep every page and serve viewport triggers until both finish
    ///
    /// The visibility loop ends when the host drops its port or the document
    /// is closed.
    pub async fn run_background(&self, events: &mut VisibilityEvents) {
        tokio::join!(
            self.scheduler.run_sweep(self.requested),
            self.scheduler.serve_visibility(events)
        );
    }

    pub async fn run_sweep(&self) {
        self.scheduler.run_sweep(self.requested).await;
    }

    /// Load a page now, regardless of sweep progress
    pub async fn request_page(&self, page: u32) -> LoadOutcome {
        self.scheduler.request(page).await
    }

    /// Re-request every page whose render failed
    pub async fn retry_failed(&self) -> Vec<(u32, LoadOutcome)> {
        let failed = self.pipeline().status().failed_pages();
        let mut outcomes = Vec::with_capacity(failed.len());
        for page in failed {
            tracing::info!(page, "retrying failed page");
            outcomes.push((page, self.scheduler.request(page).await));
        }
        outcomes
    }

    /// Recompute one page from its pristine raster
    pub fn apply_to_page(&self, page: u32, edit: &EditHistory) -> EngineResult<()> {
        self.check_page(page)?;
        self.pipeline().apply_edit(page, edit.clone())?;
        tracing::debug!(page, rotation = edit.rotation, scale = edit.scale, "edit applied to page");
        Ok(())
    }

    /// Drop a page's edits; its display raster becomes the pristine one again
    pub fn reset_page(&self, page: u32) -> EngineResult<()> {
        self.check_page(page)?;
        self.pipeline().apply_edit(page, EditHistory::default())
    }

    /// Give a loaded page a full-resolution thumbnail, e.g. once it is
    /// selected or has sat idle in view
    pub fn upgrade_thumbnail(&self, page: u32) -> EngineResult<bool> {
        self.check_page(page)?;
        self.pipeline().upgrade_thumbnail(page)
    }

    /// Apply `edit` to every page, loaded now or later
    ///
    /// The snapshot is stored before the loaded-page list is read, so a page
    /// finishing its load at any point either sees the snapshot itself or is
    /// in the list. Runs to completion once started.
    pub async fn apply_to_all(&self, edit: &EditHistory, progress: Option<ProgressCallback>) -> ApplyAllReport {
        let pipeline = self.pipeline();
        let mut tracker = ProgressTracker::new(progress);
        tracker.report(ApplyAllStage::Started);

        let snapshot = ApplyAllSnapshot::capture(edit);
        pipeline.set_snapshot(Some(snapshot));
        let pages = pipeline.store().loaded_pages();
        tracker.report(ApplyAllStage::SettingsStored);
        tracing::info!(pages = pages.len(), "applying edit to all pages");

        let shared = snapshot.to_edit_history();
        let total = pages.len();
        let mut budget = FrameBudget::for_60fps();
        let mut report = ApplyAllReport::default();

        for (index, page) in pages.into_iter().enumerate() {
            match pipeline.replace_edit(page, shared.clone()) {
                Ok(()) => report.pages_updated.push(page),
                Err(error) => tracing::warn!(page, error = %error, "apply-all skipped page"),
            }
            tracker.report(ApplyAllStage::Pages { done: index + 1, total });
            budget.checkpoint().await;
        }

        report.sheets_rebuilt = pipeline.rebuild_all_sheets();
        tracker.report(ApplyAllStage::Sheets);
        tracker.report(ApplyAllStage::Complete);
        tracing::info!(
            pages = report.pages_updated.len(),
            sheets = report.sheets_rebuilt,
            yields = budget.yields(),
            "apply-all complete"
        );
        report
    }

    /// Forget the apply-all snapshot; loaded pages keep their edits
    pub fn clear_apply_all(&self) {
        self.pipeline().set_snapshot(None);
    }

    pub fn apply_all_snapshot(&self) -> Option<ApplyAllSnapshot> {
        self.pipeline().snapshot()
    }

    /// Edit history for every page, as export expects it
    ///
    /// Loaded pages report their own history; pages not loaded yet report
    /// the apply-all snapshot (or nothing) they will receive on load.
    pub fn edit_histories(&self) -> BTreeMap<u32, EditHistory> {
        let pipeline = self.pipeline();
        let pending = pipeline.initial_edit();
        (1..=self.page_count())
            .map(|page| {
                let history = pipeline
                    .store()
                    .get(PageNumber::Single(page))
                    .map(|record| record.edit_history)
                    .unwrap_or_else(|| pending.clone());
                (page, history)
            })
            .collect()
    }

    /// Export the document's original bytes with every page's edits
    pub fn export(&self, input: &[u8], options: &ExportOptions) -> EngineResult<(Vec<u8>, ExportReport)> {
        let edits = self.edit_histories();
        Ok(export_document(input, &edits, options, self.pipeline().source().as_ref())?)
    }

    /// Changes published since the last call
    pub fn take_changes(&self) -> ChangeSet {
        self.pipeline().store().take_changes()
    }

    pub fn record(&self, number: PageNumber) -> Option<PageRecord> {
        self.pipeline().store().get(number)
    }

    pub fn load_status(&self, page: u32) -> LoadStatus {
        self.pipeline().status().status(page)
    }

    pub fn loaded_pages(&self) -> Vec<u32> {
        self.pipeline().store().loaded_pages()
    }

    pub fn failed_pages(&self) -> Vec<u32> {
        self.pipeline().status().failed_pages()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn store_stats(&self) -> StoreStats {
        self.pipeline().store().stats()
    }

    /// Cancel all work for this document and release its pages
    pub fn close(&self) {
        self.token().cancel();
        self.session.invalidate(&self.identity);
        self.pipeline().store().clear();
        self.pipeline().status().clear();
        tracing::info!(file = %self.identity, "document closed");
    }

    fn check_page(&self, page: u32) -> EngineResult<()> {
        let page_count = self.page_count();
        if page == 0 || page > page_count {
            return Err(EngineError::PageOutOfRange { page, page_count });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;
    use crate::testing::{BlankSource, CancellingSource, FlakySource};
    use page_editor_render::{draw_page, ColorMode};
    use page_editor_scheduler::{visibility_channel, LoadOrigin};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> EngineConfig {
        EngineConfig::default().with_render_scale(1.0)
    }

    fn identity(name: &str) -> FileIdentity {
        FileIdentity::new(name, 1024, 1_700_000_000_000)
    }

    fn session() -> Arc<LoaderSession<dyn DocumentSource>> {
        Arc::new(LoaderSession::new())
    }

    async fn open_with<S: DocumentSource + 'static>(source: Arc<S>, config: EngineConfig, requested: u32) -> PageEngine {
        PageEngine::open(session(), identity("doc.pdf"), config, requested, move || {
            Ok(source as Arc<dyn DocumentSource>)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_requested_page_ready_on_open() {
        let engine = open_with(Arc::new(BlankSource::new(5)), config(), 3).await;
        assert_eq!(engine.loaded_pages(), vec![3]);
        assert_eq!(engine.load_status(3), LoadStatus::Loaded);
        assert!(engine.record(PageNumber::Single(3)).is_some());
    }

    #[tokio::test]
    async fn test_requested_page_clamped() {
        let engine = open_with(Arc::new(BlankSource::new(2)), config(), 40).await;
        assert_eq!(engine.requested_page(), 2);
        assert_eq!(engine.loaded_pages(), vec![2]);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_render_once() {
        let source = Arc::new(BlankSource::new(4));
        let engine = open_with(Arc::clone(&source), config(), 1).await;

        let (a, b, c) = tokio::join!(
            engine.request_page(2),
            engine.request_page(2),
            engine.pipeline().load(2, LoadOrigin::Sweep)
        );
        let mut outcomes = vec![a, b, c];
        outcomes.sort_by_key(|outcome| *outcome != LoadOutcome::Loaded);
        assert_eq!(outcomes, vec![LoadOutcome::Loaded, LoadOutcome::Skipped, LoadOutcome::Skipped]);

        // Page 1 on open plus page 2 once
        assert_eq!(source.renders(), 2);
        assert_eq!(engine.store_stats().published, 2);
        assert_eq!(engine.store_stats().rejected, 0);
    }

    #[tokio::test]
    async fn test_cancellation_mid_render_rolls_back() {
        let source = Arc::new(CancellingSource::new(BlankSource::new(3)));
        let engine = open_with(Arc::clone(&source), config(), 1).await;

        source.arm(engine.token().clone());
        assert_eq!(engine.request_page(2).await, LoadOutcome::Cancelled);
        assert_eq!(engine.load_status(2), LoadStatus::Idle);
        assert!(engine.record(PageNumber::Single(2)).is_none());

        // The sweep stops immediately on a cancelled token
        engine.run_sweep().await;
        assert!(!engine.scheduler().is_sweep_complete());
        assert_eq!(engine.loaded_pages(), vec![1]);
    }

    #[tokio::test]
    async fn test_page_loaded_after_apply_all_matches_direct_draw() {
        let engine = open_with(Arc::new(BlankSource::new(4)), config(), 1).await;
        let edit = EditHistory::default().with_rotation(90).with_scale(150.0);

        let report = engine.apply_to_all(&edit, None).await;
        assert_eq!(report.pages_updated, vec![1]);

        engine.run_sweep().await;
        let record = engine.record(PageNumber::Single(3)).unwrap();
        let expected = draw_page(&record.pristine, &edit, 1.0, ColorMode::Color);
        assert_eq!(record.edit_history, edit);
        assert!(record.edited);
        assert!(*record.display == expected);
    }

    #[tokio::test]
    async fn test_apply_all_covers_every_loader() {
        let engine = open_with(Arc::new(BlankSource::new(6)), config(), 1).await;
        engine.request_page(4).await;

        let fractions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fractions);
        let progress: ProgressCallback = Arc::new(move |update| sink.lock().push(update.fraction));

        let edit = EditHistory::default().with_rotation(180).with_offset(4.0, -2.0);
        let (report, ()) = tokio::join!(engine.apply_to_all(&edit, Some(progress)), engine.run_sweep());
        assert!(report.pages_updated.contains(&1));
        assert!(report.pages_updated.contains(&4));

        let (port, mut events) = visibility_channel();
        port.page_visible(6);
        drop(port);
        engine.scheduler().serve_visibility(&mut events).await;

        for page in 1..=6 {
            let record = engine.record(PageNumber::Single(page)).unwrap();
            assert_eq!(record.edit_history, edit, "page {page}");
        }

        let fractions = fractions.lock().clone();
        assert_eq!(fractions.first().copied(), Some(0.0));
        assert_eq!(fractions.last().copied(), Some(1.0));
        assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn test_apply_all_rebuilds_sheets() {
        let engine = open_with(Arc::new(BlankSource::new(3)), config().with_layout(Layout::TwoUp), 1).await;
        engine.run_sweep().await;
        engine.take_changes();

        let report = engine.apply_to_all(&EditHistory::default().with_scale(50.0), None).await;
        assert_eq!(report.sheets_rebuilt, 2);

        let changes = engine.take_changes();
        assert!(changes[&PageNumber::Sheet(1, 2)].edited);
        assert!(changes[&PageNumber::Sheet(3, 3)].edited);
        assert!(changes[&PageNumber::Single(2)].edited);
    }

    #[tokio::test]
    async fn test_failed_page_retry() {
        let source = Arc::new(FlakySource::failing_once(BlankSource::new(3), &[2]));
        let engine = open_with(source, config(), 1).await;

        engine.run_sweep().await;
        assert_eq!(engine.failed_pages(), vec![2]);
        assert_eq!(engine.loaded_pages(), vec![1, 3]);
        assert_eq!(engine.stats().loads_failed, 1);

        assert_eq!(engine.retry_failed().await, vec![(2, LoadOutcome::Loaded)]);
        assert!(engine.failed_pages().is_empty());
        assert_eq!(engine.loaded_pages(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_apply_and_reset_page() {
        let engine = open_with(Arc::new(BlankSource::new(3)), config(), 1).await;
        engine.take_changes();

        engine.apply_to_page(1, &EditHistory::default().with_rotation(270)).unwrap();
        assert!(engine.take_changes()[&PageNumber::Single(1)].edited);

        engine.reset_page(1).unwrap();
        let record = engine.record(PageNumber::Single(1)).unwrap();
        assert!(!record.edited);
        assert!(Arc::ptr_eq(&record.pristine, &record.display));

        assert!(matches!(
            engine.apply_to_page(2, &EditHistory::default()),
            Err(EngineError::PageNotLoaded(2))
        ));
        assert!(matches!(
            engine.apply_to_page(7, &EditHistory::default()),
            Err(EngineError::PageOutOfRange { page: 7, page_count: 3 })
        ));
    }

    #[tokio::test]
    async fn test_edit_histories_follow_snapshot() {
        let engine = open_with(Arc::new(BlankSource::new(3)), config(), 1).await;
        let shared = EditHistory::default().with_rotation(180);
        engine.apply_to_all(&shared, None).await;

        let own = EditHistory::default().with_scale(50.0);
        engine.apply_to_page(1, &own).unwrap();

        let histories = engine.edit_histories();
        assert_eq!(histories[&1], own);
        assert_eq!(histories[&2], shared);
        assert_eq!(histories[&3], shared);

        engine.clear_apply_all();
        assert_eq!(engine.apply_all_snapshot(), None);
        assert_eq!(engine.edit_histories()[&2], EditHistory::default());
        assert_eq!(engine.edit_histories()[&1], own);
    }

    #[tokio::test]
    async fn test_session_reuses_parse() {
        let session = session();
        let parses = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let counter = Arc::clone(&parses);
            PageEngine::open(Arc::clone(&session), identity("a.pdf"), config(), 1, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(BlankSource::new(2)) as Arc<dyn DocumentSource>)
            })
            .await
            .unwrap();
        }
        assert_eq!(parses.load(Ordering::SeqCst), 1);
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn test_switching_files_invalidates_previous() {
        let session = session();
        let first = PageEngine::open(Arc::clone(&session), identity("a.pdf"), config(), 1, || {
            Ok(Arc::new(BlankSource::new(2)) as Arc<dyn DocumentSource>)
        })
        .await
        .unwrap();

        let _second = PageEngine::open(Arc::clone(&session), identity("b.pdf"), config(), 1, || {
            Ok(Arc::new(BlankSource::new(2)) as Arc<dyn DocumentSource>)
        })
        .await
        .unwrap();

        assert!(first.token().is_cancelled());
        assert_eq!(first.request_page(2).await, LoadOutcome::Cancelled);
        assert!(session.get(&identity("a.pdf")).is_none());
    }

    #[tokio::test]
    async fn test_parse_failure_is_fatal() {
        let session = session();
        let result = PageEngine::open(Arc::clone(&session), identity("bad.pdf"), config(), 1, || {
            Err(page_editor_render::RenderError::NoPages)
        })
        .await;
        let error = result.err().unwrap();
        assert!(matches!(error, EngineError::DocumentParse(_)));
        assert!(error.is_fatal());
        assert!(!session.is_loading(&identity("bad.pdf")));
    }

    #[tokio::test]
    async fn test_open_path_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three.pdf");
        let bytes = crate::testing::sample_pdf(&[(100, 200), (100, 200), (200, 100)]);
        std::fs::write(&path, &bytes).unwrap();

        let engine = PageEngine::open_path(session(), &path, config(), 2).await.unwrap();
        assert_eq!(engine.page_count(), 3);
        assert_eq!(engine.identity().name, "three.pdf");

        engine.apply_to_page(2, &EditHistory::default().with_rotation(90)).unwrap();
        let (output, report) = engine.export(&bytes, &ExportOptions::default()).unwrap();
        assert_eq!(report.strategy(1), Some(crate::ExportStrategy::Unchanged));
        assert_eq!(report.strategy(2), Some(crate::ExportStrategy::Vector));
        assert_eq!(lopdf::Document::load_mem(&output).unwrap().get_pages().len(), 3);
    }

    #[tokio::test]
    async fn test_upgrade_thumbnail_checks_page_range() {
        let engine = open_with(Arc::new(BlankSource::new(3)), config(), 1).await;
        assert!(engine.upgrade_thumbnail(1).unwrap());
        assert_eq!(
            engine.record(PageNumber::Single(1)).unwrap().thumbnail.tier,
            page_editor_render::ThumbnailTier::Full
        );
        assert!(matches!(
            engine.upgrade_thumbnail(4),
            Err(EngineError::PageOutOfRange { page: 4, page_count: 3 })
        ));
    }

    #[tokio::test]
    async fn test_close_releases_document() {
        let session = session();
        let engine = PageEngine::open(Arc::clone(&session), identity("c.pdf"), config(), 1, || {
            Ok(Arc::new(BlankSource::new(2)) as Arc<dyn DocumentSource>)
        })
        .await
        .unwrap();

        engine.close();
        assert!(session.is_empty());
        assert!(engine.loaded_pages().is_empty());
        assert_eq!(engine.request_page(2).await, LoadOutcome::Cancelled);
    }
}
