//! Interactive edit state for the page being edited
//!
//! The session holds rotation, scale, offsets and the crop tool. It knows
//! nothing about rasters; [`EditSession::to_edit_history`] is what the engine
//! applies to a page or to the whole document.

use crate::crop::{CropHandle, CropTool};
use page_editor_render::{CropArea, Dimensions, EditHistory, Rect};

/// Smallest user scale in percent
pub const MIN_SCALE: f64 = 10.0;

/// Largest user scale in percent
pub const MAX_SCALE: f64 = 400.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    rotation: i32,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    fit_crop_to_page: bool,
    /// Committed crop, normalized against the original page
    crop: Option<CropArea>,
    /// Present while the crop tool is open
    tool: Option<CropTool>,
}

impl Default for EditSession {
    fn default() -> Self {
        Self {
            rotation: 0,
            scale: page_editor_render::edit_history::DEFAULT_SCALE,
            offset_x: 0.0,
            offset_y: 0.0,
            fit_crop_to_page: false,
            crop: None,
            tool: None,
        }
    }
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume editing a page that already carries edits
    pub fn from_edit_history(history: &EditHistory) -> Self {
        Self {
            rotation: history.rotation,
            scale: clamp_scale(history.scale),
            offset_x: history.offset_x,
            offset_y: history.offset_y,
            fit_crop_to_page: history.fits_crop_to_page(),
            crop: history.crop_area.filter(|crop| !crop.is_full_page()),
            tool: None,
        }
    }

    pub fn to_edit_history(&self) -> EditHistory {
        let history = EditHistory::default()
            .with_rotation(self.rotation)
            .with_scale(self.scale)
            .with_offset(self.offset_x, self.offset_y);
        match self.crop {
            Some(crop) => history.with_crop(crop, self.fit_crop_to_page),
            None => history,
        }
    }

    pub fn rotation(&self) -> i32 {
        self.rotation
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn offset(&self) -> (f64, f64) {
        (self.offset_x, self.offset_y)
    }

    pub fn crop(&self) -> Option<CropArea> {
        self.crop
    }

    pub fn fit_crop_to_page(&self) -> bool {
        self.fit_crop_to_page
    }

    /// Rotation stays as entered; only consumers normalize it
    pub fn rotate_clockwise(&mut self) {
        self.rotation += 90;
    }

    pub fn rotate_counter_clockwise(&mut self) {
        self.rotation -= 90;
    }

    pub fn set_rotation(&mut self, rotation: i32) {
        self.rotation = rotation;
    }

    /// Set the user scale, clamped to [`MIN_SCALE`]..=[`MAX_SCALE`]
    pub fn set_scale(&mut self, scale: f64) -> f64 {
        self.scale = clamp_scale(scale);
        self.scale
    }

    /// Move the page by `(dx, dy)` points
    pub fn nudge(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    pub fn set_offset(&mut self, offset_x: f64, offset_y: f64) {
        self.offset_x = offset_x;
        self.offset_y = offset_y;
    }

    pub fn set_fit_crop_to_page(&mut self, fit: bool) {
        self.fit_crop_to_page = fit;
    }

    /// Open the crop tool on `canvas` (if needed) and start dragging `handle`
    pub fn begin_crop(&mut self, canvas: Dimensions, handle: CropHandle, x: f64, y: f64) {
        let committed = self.crop;
        let tool = self.tool.get_or_insert_with(|| match committed {
            Some(crop) => CropTool::from_crop(canvas, crop),
            None => CropTool::new(canvas),
        });
        tool.begin(handle, x, y);
    }

    /// Pointer moved; `None` when the crop tool is not open
    pub fn drag_crop(&mut self, x: f64, y: f64) -> Option<Rect> {
        self.tool.as_mut().map(|tool| tool.drag_to(x, y))
    }

    pub fn end_crop(&mut self) -> Option<Rect> {
        self.tool.as_mut().map(CropTool::end)
    }

    pub fn cancel_crop(&mut self) -> Option<Rect> {
        self.tool.as_mut().map(CropTool::cancel)
    }

    /// Rectangle currently shown by the crop tool
    pub fn crop_rect(&self) -> Option<Rect> {
        self.tool.as_ref().map(CropTool::rect)
    }

    /// Commit the crop tool's rectangle, normalized against its canvas
    ///
    /// A rectangle covering the whole canvas clears the crop.
    pub fn apply_crop(&mut self) -> Option<CropArea> {
        let mut tool = self.tool.take()?;
        tool.end();
        let crop = tool.normalized();
        self.crop = (!crop.is_full_page()).then_some(crop);
        tracing::debug!(crop = ?self.crop, fit = self.fit_crop_to_page, "crop applied");
        self.crop
    }

    /// Drop both the committed crop and any open crop tool
    pub fn clear_crop(&mut self) {
        self.crop = None;
        self.tool = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_identity(&self) -> bool {
        self.to_edit_history().is_identity()
    }
}

fn clamp_scale(scale: f64) -> f64 {
    if scale.is_finite() {
        scale.max(MIN_SCALE).min(MAX_SCALE)
    } else {
        page_editor_render::edit_history::DEFAULT_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rotation_is_not_normalized() {
        let mut session = EditSession::new();
        session.rotate_counter_clockwise();
        assert_eq!(session.rotation(), -90);
        for _ in 0..5 {
            session.rotate_clockwise();
        }
        assert_eq!(session.rotation(), 360);
        assert!(session.is_identity());
    }

    #[test]
    fn test_scale_clamped() {
        let mut session = EditSession::new();
        assert_eq!(session.set_scale(5.0), MIN_SCALE);
        assert_eq!(session.set_scale(1000.0), MAX_SCALE);
        assert_eq!(session.set_scale(f64::NAN), 100.0);
        assert_eq!(session.set_scale(150.0), 150.0);
    }

    #[test]
    fn test_nudge_accumulates() {
        let mut session = EditSession::new();
        session.nudge(5.0, -2.0);
        session.nudge(1.0, 1.0);
        assert_eq!(session.offset(), (6.0, -1.0));
        session.set_offset(0.0, 0.0);
        assert!(session.is_identity());
    }

    #[test]
    fn test_crop_commit_produces_pre_cropped_history() {
        let canvas = Dimensions::new(400.0, 300.0);
        let mut session = EditSession::new();
        session.set_fit_crop_to_page(true);
        session.begin_crop(canvas, CropHandle::SouthEast, 400.0, 300.0);
        session.drag_crop(200.0, 150.0);
        session.end_crop();

        let crop = session.apply_crop().unwrap();
        assert_eq!(crop, CropArea::new(0.0, 0.0, 0.5, 0.5));
        assert!(session.crop_rect().is_none());

        let history = session.to_edit_history();
        assert_eq!(history.crop_area, Some(crop));
        assert_eq!(history.is_cropped, Some(true));
        assert_eq!(history.fit_crop_to_page, Some(true));
        assert!(!history.is_identity());
    }

    #[test]
    fn test_full_canvas_crop_clears() {
        let canvas = Dimensions::new(400.0, 300.0);
        let mut session = EditSession::new();
        session.begin_crop(canvas, CropHandle::Center, 10.0, 10.0);
        assert_eq!(session.apply_crop(), None);
        assert_eq!(session.to_edit_history().crop_area, None);
    }

    #[test]
    fn test_cancel_crop_keeps_committed_crop() {
        let canvas = Dimensions::new(400.0, 300.0);
        let mut session = EditSession::new();
        session.begin_crop(canvas, CropHandle::NorthWest, 0.0, 0.0);
        session.drag_crop(100.0, 75.0);
        session.apply_crop();

        session.begin_crop(canvas, CropHandle::NorthWest, 100.0, 75.0);
        session.drag_crop(200.0, 150.0);
        assert_eq!(session.cancel_crop(), Some(Rect::new(100.0, 75.0, 300.0, 225.0)));
        assert_eq!(session.crop(), Some(CropArea::new(0.25, 0.25, 0.75, 0.75)));
    }

    #[test]
    fn test_edit_history_round_trip() {
        let history = EditHistory::default()
            .with_rotation(-90)
            .with_scale(80.0)
            .with_offset(12.0, -4.0)
            .with_crop(CropArea::new(0.1, 0.1, 0.5, 0.5), false);
        let session = EditSession::from_edit_history(&history);
        assert_eq!(session.to_edit_history(), history);
    }

    #[test]
    fn test_reset_and_clear() {
        let mut session = EditSession::new();
        session.set_rotation(270);
        session.begin_crop(Dimensions::new(100.0, 100.0), CropHandle::SouthEast, 100.0, 100.0);
        session.drag_crop(60.0, 60.0);
        session.apply_crop();
        session.clear_crop();
        assert_eq!(session.crop(), None);
        session.reset();
        assert_eq!(session, EditSession::new());
    }
}
