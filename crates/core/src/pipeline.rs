//! Page pipeline: rasterize, derive, publish
//!
//! Every loading path (requested page, sweep, viewport, on-demand, retry)
//! ends up in [`PagePipeline::load`]. The load-status map decides who gets
//! to render a page; the store decides what is visible. Between the two the
//! pipeline suspends only at decode/draw boundaries, and re-checks the file
//! token after each suspension so a stale load never publishes.

use crate::apply_all::ApplyAllSnapshot;
use crate::config::{EngineConfig, Layout};
use crate::error::{EngineError, EngineResult};
use page_editor_cache::{LoadStatusMap, PageNumber, PageRecord, PageStore, Rendition};
use page_editor_render::{
    compose_sheet, draw_page, full_thumbnail, generate_thumbnail, ColorMode, DocumentSource, EditHistory,
    RenderResult, RgbaImage, Thumbnail, ThumbnailTier,
};
use page_editor_scheduler::{CancellationToken, LoadOrigin, LoadOutcome, PageLoader};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct PagePipeline {
    source: Arc<dyn DocumentSource>,
    token: CancellationToken,
    status: LoadStatusMap,
    store: PageStore,
    snapshot: Mutex<Option<ApplyAllSnapshot>>,
    config: EngineConfig,
}

impl PagePipeline {
    pub fn new(source: Arc<dyn DocumentSource>, token: CancellationToken, config: EngineConfig) -> Self {
        Self {
            source,
            token,
            status: LoadStatusMap::new(),
            store: PageStore::new(),
            snapshot: Mutex::new(None),
            config,
        }
    }

    pub fn source(&self) -> &Arc<dyn DocumentSource> {
        &self.source
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn status(&self) -> &LoadStatusMap {
        &self.status
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Option<ApplyAllSnapshot> {
        *self.snapshot.lock()
    }

    pub(crate) fn set_snapshot(&self, snapshot: Option<ApplyAllSnapshot>) {
        *self.snapshot.lock() = snapshot;
    }

    /// Edit a page receives when it first loads
    pub fn initial_edit(&self) -> EditHistory {
        self.snapshot()
            .map(|snapshot| snapshot.to_edit_history())
            .unwrap_or_default()
    }

    /// Display raster and thumbnail for `edit` applied to `pristine`
    ///
    /// An identity edit in color reuses the pristine raster itself.
    pub fn render_rendition(&self, pristine: &Arc<RgbaImage>, edit: EditHistory) -> RenderResult<Rendition> {
        let identity = edit.is_identity();
        let display = if identity && self.config.color_mode == ColorMode::Color {
            Arc::clone(pristine)
        } else {
            Arc::new(draw_page(
                pristine,
                &edit,
                self.config.render_scale,
                self.config.color_mode,
            ))
        };
        let thumbnail = generate_thumbnail(&display)?;
        Ok(Rendition {
            display,
            thumbnail,
            edit_history: edit,
            edited: !identity,
        })
    }

    /// Recompute a loaded page from its pristine raster, then its sheet
    pub fn apply_edit(&self, page: u32, edit: EditHistory) -> EngineResult<()> {
        self.replace_edit(page, edit)?;
        self.rebuild_sheet_for(page);
        Ok(())
    }

    /// Recompute a loaded page from its pristine raster, leaving sheets alone
    pub(crate) fn replace_edit(&self, page: u32, edit: EditHistory) -> EngineResult<()> {
        let pristine = self.store.pristine(page).ok_or(EngineError::PageNotLoaded(page))?;
        let rendition = self
            .render_rendition(&pristine, edit)
            .map_err(|source| EngineError::PageRender { page, source })?;
        if !self.store.replace_rendition(PageNumber::Single(page), rendition) {
            return Err(EngineError::PageNotLoaded(page));
        }
        Ok(())
    }

    /// Re-encode a loaded page's thumbnail from its display raster at full
    /// resolution
    ///
    /// Returns `false` when the thumbnail is already at the full tier. The
    /// next edit to the page brings it back to the preview tier.
    pub fn upgrade_thumbnail(&self, page: u32) -> EngineResult<bool> {
        let number = PageNumber::Single(page);
        let record = self.store.get(number).ok_or(EngineError::PageNotLoaded(page))?;
        if record.thumbnail.tier == ThumbnailTier::Full {
            return Ok(false);
        }

        let thumbnail = full_thumbnail(&record.display).map_err(|source| EngineError::PageRender { page, source })?;
        let rendition = Rendition {
            display: record.display,
            thumbnail,
            edit_history: record.edit_history,
            edited: record.edited,
        };
        if !self.store.replace_rendition(number, rendition) {
            return Err(EngineError::PageNotLoaded(page));
        }
        tracing::debug!(page, "thumbnail upgraded to full tier");
        Ok(true)
    }

    /// Rebuild the two-up sheet holding `page`, if the layout has one
    pub fn rebuild_sheet_for(&self, page: u32) -> bool {
        match self.config.layout.sheet_for(page, self.source.page_count()) {
            Some(number) => self.rebuild_sheet(number),
            None => false,
        }
    }

    /// Compose a sheet from its pages' display rasters
    ///
    /// Returns `false` until every page of the sheet is published.
    pub fn rebuild_sheet(&self, number: PageNumber) -> bool {
        let constituents: Option<Vec<PageRecord>> = number
            .pages()
            .into_iter()
            .map(|page| self.store.get(PageNumber::Single(page)))
            .collect();
        let Some(records) = constituents else {
            return false;
        };
        let Some((left, rest)) = records.split_first() else {
            return false;
        };
        let right = rest.first();

        let sheet = Arc::new(compose_sheet(
            &left.display,
            right.map(|record| record.display.as_ref()),
            self.config.sheet_gap,
        ));
        let thumbnail = generate_thumbnail(&sheet).unwrap_or_else(|error| {
            tracing::warn!(sheet = %number, error = %error, "sheet thumbnail failed");
            Thumbnail::placeholder()
        });
        let edited = records.iter().any(|record| record.edited);

        self.store.upsert_sheet(PageRecord {
            edited,
            ..PageRecord::pristine(number, sheet, thumbnail)
        });
        tracing::debug!(sheet = %number, edited, "sheet rebuilt");
        true
    }

    /// Rebuild every sheet whose pages are all loaded
    pub fn rebuild_all_sheets(&self) -> usize {
        if self.config.layout != Layout::TwoUp {
            return 0;
        }
        let page_count = self.source.page_count();
        (1..=page_count)
            .step_by(2)
            .filter_map(|page| self.config.layout.sheet_for(page, page_count))
            .filter(|number| self.rebuild_sheet(*number))
            .count()
    }

    fn still_current(&self, page: u32) -> bool {
        !self.token.is_cancelled() && self.status.is_loading(page)
    }

    /// Render and publish `page` unless someone else already has
    pub async fn load(&self, page: u32, origin: LoadOrigin) -> LoadOutcome {
        if self.token.is_cancelled() {
            return LoadOutcome::Cancelled;
        }
        let page_count = self.source.page_count();
        if page == 0 || page > page_count {
            tracing::warn!(page, page_count, ?origin, "load requested for page out of range");
            return LoadOutcome::Failed(format!("page {page} out of range (page_count={page_count})"));
        }
        if !self.status.try_begin(page) {
            tracing::debug!(page, ?origin, "page already loading or loaded");
            return LoadOutcome::Skipped;
        }

        tracing::debug!(page, ?origin, "loading page");
        tokio::task::yield_now().await;
        if !self.still_current(page) {
            self.status.rollback(page);
            return LoadOutcome::Cancelled;
        }

        let pristine = match self.source.rasterize(page, self.config.render_scale) {
            Ok(raster) => Arc::new(raster),
            Err(error) => return self.fail(page, error.to_string()),
        };

        tokio::task::yield_now().await;
        if !self.still_current(page) {
            self.status.rollback(page);
            tracing::debug!(page, "load discarded after cancellation");
            return LoadOutcome::Cancelled;
        }

        // No suspension from here on: read the snapshot, derive, publish.
        let edit = self.initial_edit();
        let rendition = match self.render_rendition(&pristine, edit) {
            Ok(rendition) => rendition,
            Err(error) => return self.fail(page, error.to_string()),
        };
        let record = PageRecord::pristine(PageNumber::Single(page), pristine, Thumbnail::placeholder())
            .with_rendition(rendition);
        let edited = record.edited;

        if !self.store.publish(record) {
            // Already published; the existing pristine stays authoritative
            self.status.finish(page);
            return LoadOutcome::Skipped;
        }
        self.status.finish(page);
        self.rebuild_sheet_for(page);

        tracing::info!(page, ?origin, edited, "page loaded");
        LoadOutcome::Loaded
    }

    fn fail(&self, page: u32, reason: String) -> LoadOutcome {
        tracing::warn!(page, error = %reason, "page failed to render");
        self.status.fail(page, reason.clone());
        LoadOutcome::Failed(reason)
    }
}

impl PageLoader for PagePipeline {
    fn page_count(&self) -> u32 {
        self.source.page_count()
    }

    async fn load_page(&self, page: u32, origin: LoadOrigin) -> LoadOutcome {
        self.load(page, origin).await
    }
}
