//! Published page records and the change set handed to the host
//!
//! A record's pristine raster is written once, on the first successful
//! render, and never replaced. Everything derived from it (display raster,
//! thumbnail, edit history) is swapped as one unit through
//! [`PageStore::replace_rendition`], so a reader never sees a thumbnail from
//! one edit next to a raster from another.

use page_editor_render::{EditHistory, RgbaImage, Thumbnail};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Key of a page record: a single page or a two-up sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PageNumber {
    Single(u32),
    Sheet(u32, u32),
}

impl PageNumber {
    /// Pages shown by this record
    pub fn pages(&self) -> Vec<u32> {
        match *self {
            PageNumber::Single(page) => vec![page],
            PageNumber::Sheet(left, right) if left == right => vec![left],
            PageNumber::Sheet(left, right) => vec![left, right],
        }
    }

    pub fn contains(&self, page: u32) -> bool {
        match *self {
            PageNumber::Single(own) => own == page,
            PageNumber::Sheet(left, right) => left == page || right == page,
        }
    }

    pub fn is_sheet(&self) -> bool {
        matches!(self, PageNumber::Sheet(..))
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageNumber::Single(page) => write!(f, "{page}"),
            PageNumber::Sheet(left, right) => write!(f, "{left}-{right}"),
        }
    }
}

impl FromStr for PageNumber {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .ok()
                .filter(|page| *page > 0)
                .ok_or_else(|| format!("invalid page number: {value}"))
        };
        match value.split_once('-') {
            Some((left, right)) => Ok(PageNumber::Sheet(parse(left)?, parse(right)?)),
            None => Ok(PageNumber::Single(parse(value)?)),
        }
    }
}

/// One published page or sheet
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub number: PageNumber,
    /// First render, never modified
    pub pristine: Arc<RgbaImage>,
    /// Edits baked in; preview only
    pub display: Arc<RgbaImage>,
    pub thumbnail: Thumbnail,
    pub edit_history: EditHistory,
    pub edited: bool,
}

impl PageRecord {
    /// Fresh record whose display raster is the pristine one
    pub fn pristine(number: PageNumber, pristine: Arc<RgbaImage>, thumbnail: Thumbnail) -> Self {
        Self {
            number,
            display: Arc::clone(&pristine),
            pristine,
            thumbnail,
            edit_history: EditHistory::default(),
            edited: false,
        }
    }

    pub fn is_sheet(&self) -> bool {
        self.number.is_sheet()
    }

    pub fn contains_pages(&self) -> Vec<u32> {
        self.number.pages()
    }

    pub fn with_rendition(mut self, rendition: Rendition) -> Self {
        self.apply(rendition);
        self
    }

    fn apply(&mut self, rendition: Rendition) {
        self.display = rendition.display;
        self.thumbnail = rendition.thumbnail;
        self.edit_history = rendition.edit_history;
        self.edited = rendition.edited;
    }

    fn change(&self) -> PageChange {
        PageChange {
            thumbnail: self.thumbnail.clone(),
            edited: self.edited,
            raster: Arc::clone(&self.display),
        }
    }
}

/// Everything derived from a pristine raster for one edit
#[derive(Debug, Clone)]
pub struct Rendition {
    pub display: Arc<RgbaImage>,
    pub thumbnail: Thumbnail,
    pub edit_history: EditHistory,
    pub edited: bool,
}

/// What the host needs to refresh one page
#[derive(Debug, Clone)]
pub struct PageChange {
    pub thumbnail: Thumbnail,
    pub edited: bool,
    pub raster: Arc<RgbaImage>,
}

pub type ChangeSet = BTreeMap<PageNumber, PageChange>;

/// Statistics about store usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Records published
    pub published: u64,

    /// Renditions replaced
    pub replaced: u64,

    /// Publishes rejected because the record already existed
    pub rejected: u64,
}

struct StoreState {
    records: BTreeMap<PageNumber, PageRecord>,
    pending: ChangeSet,
    stats: StoreStats,
}

/// Page records for one open document
pub struct PageStore {
    state: Mutex<StoreState>,
}

impl PageStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                records: BTreeMap::new(),
                pending: ChangeSet::new(),
                stats: StoreStats::default(),
            }),
        }
    }

    /// Insert a new record
    ///
    /// Returns `false` and changes nothing when the page is already
    /// published; the existing pristine raster stays authoritative.
    pub fn publish(&self, record: PageRecord) -> bool {
        let mut state = self.state.lock();
        if state.records.contains_key(&record.number) {
            state.stats.rejected += 1;
            tracing::warn!(page = %record.number, "rejected second publish of page");
            return false;
        }
        state.pending.insert(record.number, record.change());
        state.stats.published += 1;
        state.records.insert(record.number, record);
        true
    }

    /// Swap the derived rendition of an existing record
    pub fn replace_rendition(&self, number: PageNumber, rendition: Rendition) -> bool {
        let mut state = self.state.lock();
        let Some(record) = state.records.get_mut(&number) else {
            return false;
        };
        record.apply(rendition);
        let change = record.change();
        state.pending.insert(number, change);
        state.stats.replaced += 1;
        true
    }

    /// Insert or fully replace a sheet record
    ///
    /// Sheets are composed from their pages' display rasters, so unlike single
    /// pages they are rebuilt whenever a constituent changes.
    pub fn upsert_sheet(&self, record: PageRecord) {
        let mut state = self.state.lock();
        state.pending.insert(record.number, record.change());
        if state.records.insert(record.number, record).is_some() {
            state.stats.replaced += 1;
        } else {
            state.stats.published += 1;
        }
    }

    pub fn get(&self, number: PageNumber) -> Option<PageRecord> {
        self.state.lock().records.get(&number).cloned()
    }

    pub fn pristine(&self, page: u32) -> Option<Arc<RgbaImage>> {
        self.state
            .lock()
            .records
            .get(&PageNumber::Single(page))
            .map(|record| Arc::clone(&record.pristine))
    }

    pub fn contains(&self, number: PageNumber) -> bool {
        self.state.lock().records.contains_key(&number)
    }

    /// Published single pages, ascending
    pub fn loaded_pages(&self) -> Vec<u32> {
        self.state
            .lock()
            .records
            .keys()
            .filter_map(|number| match number {
                PageNumber::Single(page) => Some(*page),
                PageNumber::Sheet(..) => None,
            })
            .collect()
    }

    pub fn sheets(&self) -> Vec<PageNumber> {
        self.state
            .lock()
            .records
            .keys()
            .filter(|number| number.is_sheet())
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Drain changes recorded since the last call
    pub fn take_changes(&self) -> ChangeSet {
        std::mem::take(&mut self.state.lock().pending)
    }

    pub fn stats(&self) -> StoreStats {
        self.state.lock().stats
    }

    /// Drop every record, e.g. when the document is closed
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.records.clear();
        state.pending.clear();
    }
}

impl Default for PageStore {
    fn default() -> Self {
        Self::new()
    }
}
