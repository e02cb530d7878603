//! Page Editor Core Library
//!
//! The page engine and its editing model: engine configuration, the crop
//! tool and edit session, apply-to-all snapshots, the page pipeline the
//! scheduler drives, and PDF export.

pub mod apply_all;
pub mod config;
pub mod crop;
pub mod edit_session;
pub mod engine;
pub mod error;
pub mod pdf_export;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use apply_all::{
    ApplyAllProgress, ApplyAllReport, ApplyAllSettings, ApplyAllSnapshot, ApplyAllStage, CropInfo,
    ProgressCallback,
};
pub use config::{ConfigError, EngineConfig, Layout};
pub use crop::{drag_rect, CropDrag, CropHandle, CropTool, MIN_CROP_SIZE};
pub use edit_session::{EditSession, MAX_SCALE, MIN_SCALE};
pub use engine::PageEngine;
pub use error::{EngineError, EngineResult};
pub use pdf_export::{
    choose_strategy, export_document, export_to_path, ExportError, ExportOptions, ExportReport,
    ExportResult, ExportStrategy,
};
pub use pipeline::PagePipeline;
