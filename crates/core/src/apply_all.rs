//! Apply-to-all snapshot and progress reporting
//!
//! Applying an edit to every page stores the shared settings once. Pages
//! already loaded are recomputed immediately; pages that load afterwards read
//! the same snapshot, so every page ends up with identical edits no matter
//! which loader produced it.

use page_editor_render::{CropArea, EditHistory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Geometric settings shared by every page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyAllSettings {
    pub rotation: i32,
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropInfo {
    pub crop_area: CropArea,
    pub fit_crop_to_page: bool,
}

/// Settings captured at the moment "apply to all" was issued
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyAllSnapshot {
    pub settings: ApplyAllSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_info: Option<CropInfo>,
}

impl ApplyAllSnapshot {
    pub fn capture(edit: &EditHistory) -> Self {
        Self {
            settings: ApplyAllSettings {
                rotation: edit.rotation,
                scale: edit.scale,
                offset_x: edit.offset_x,
                offset_y: edit.offset_y,
            },
            crop_info: edit
                .crop_area
                .filter(|crop| !crop.is_full_page())
                .map(|crop_area| CropInfo {
                    crop_area,
                    fit_crop_to_page: edit.fits_crop_to_page(),
                }),
        }
    }

    /// History every page receives
    pub fn to_edit_history(&self) -> EditHistory {
        let history = EditHistory::default()
            .with_rotation(self.settings.rotation)
            .with_scale(self.settings.scale)
            .with_offset(self.settings.offset_x, self.settings.offset_y);
        match self.crop_info {
            Some(info) => history.with_crop(info.crop_area, info.fit_crop_to_page),
            None => history,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAllStage {
    Started,
    SettingsStored,
    Pages { done: usize, total: usize },
    Sheets,
    Complete,
}

impl ApplyAllStage {
    pub fn fraction(&self) -> f64 {
        match *self {
            ApplyAllStage::Started => 0.0,
            ApplyAllStage::SettingsStored => 0.1,
            ApplyAllStage::Pages { total: 0, .. } => 0.8,
            ApplyAllStage::Pages { done, total } => {
                0.1 + 0.7 * (done.min(total) as f64 / total as f64)
            }
            ApplyAllStage::Sheets => 0.9,
            ApplyAllStage::Complete => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApplyAllProgress {
    pub stage: ApplyAllStage,
    /// Monotonic, in `0.0..=1.0`
    pub fraction: f64,
}

/// Receives progress updates; called on the engine's task
pub type ProgressCallback = Arc<dyn Fn(ApplyAllProgress) + Send + Sync>;

/// Forwards stages to the callback, never letting the fraction go backwards
pub(crate) struct ProgressTracker {
    callback: Option<ProgressCallback>,
    last: f64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self { callback, last: 0.0 }
    }

    pub(crate) fn report(&mut self, stage: ApplyAllStage) {
        let fraction = stage.fraction().max(self.last).min(1.0);
        self.last = fraction;
        tracing::debug!(?stage, fraction, "apply-all progress");
        if let Some(callback) = &self.callback {
            callback(ApplyAllProgress { stage, fraction });
        }
    }
}

/// Outcome of one apply-to-all run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyAllReport {
    pub pages_updated: Vec<u32>,
    pub sheets_rebuilt: usize,
}
