//! Crop drag handling
//!
//! While the user drags, the crop rectangle lives in canvas pixels. Corner
//! handles resize from the opposite corner; the center handle translates.
//! Every update clamps position first and size second, against the canvas
//! bounds and a 50px minimum. At extreme drags that order lets the anchored
//! corner drift; hosts depend on that exact behavior.

use page_editor_render::{CropArea, Dimensions, Rect};
use std::str::FromStr;

/// Smallest crop edge in canvas pixels
pub const MIN_CROP_SIZE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CropHandle {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
    Center,
}

impl FromStr for CropHandle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "nw" => Ok(CropHandle::NorthWest),
            "ne" => Ok(CropHandle::NorthEast),
            "sw" => Ok(CropHandle::SouthWest),
            "se" => Ok(CropHandle::SouthEast),
            "center" | "centre" | "move" => Ok(CropHandle::Center),
            other => Err(format!("unknown crop handle: {other}")),
        }
    }
}

/// Drag sub-state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropDrag {
    Idle,
    Dragging {
        handle: CropHandle,
        pointer_start: (f64, f64),
        rect_start: Rect,
    },
}

/// Lower bound wins when the range is empty
fn clamp_low(value: f64, low: f64, high: f64) -> f64 {
    value.min(high).max(low)
}

/// Rectangle after dragging `handle` by `(dx, dy)` from `start`
pub fn drag_rect(start: Rect, handle: CropHandle, dx: f64, dy: f64, canvas: Dimensions) -> Rect {
    let (mut x, mut y, mut width, mut height) = match handle {
        CropHandle::Center => (start.x + dx, start.y + dy, start.width, start.height),
        CropHandle::NorthWest => (start.x + dx, start.y + dy, start.width - dx, start.height - dy),
        CropHandle::NorthEast => (start.x, start.y + dy, start.width + dx, start.height - dy),
        CropHandle::SouthWest => (start.x + dx, start.y, start.width - dx, start.height + dy),
        CropHandle::SouthEast => (start.x, start.y, start.width + dx, start.height + dy),
    };

    // Position first
    let (reserve_w, reserve_h) = match handle {
        CropHandle::Center => (width, height),
        _ => (MIN_CROP_SIZE, MIN_CROP_SIZE),
    };
    x = clamp_low(x, 0.0, canvas.width - reserve_w);
    y = clamp_low(y, 0.0, canvas.height - reserve_h);

    // Then size
    width = clamp_low(width, MIN_CROP_SIZE, canvas.width - x);
    height = clamp_low(height, MIN_CROP_SIZE, canvas.height - y);

    Rect::new(x, y, width, height)
}

/// Crop rectangle plus its drag state, in canvas pixels
#[derive(Debug, Clone, PartialEq)]
pub struct CropTool {
    canvas: Dimensions,
    rect: Rect,
    drag: CropDrag,
}

impl CropTool {
    /// Start with the crop covering the whole canvas
    pub fn new(canvas: Dimensions) -> Self {
        Self {
            canvas,
            rect: Rect::full(canvas),
            drag: CropDrag::Idle,
        }
    }

    /// Start from a committed crop
    pub fn from_crop(canvas: Dimensions, crop: CropArea) -> Self {
        Self {
            canvas,
            rect: crop.clamped().to_rect(canvas),
            drag: CropDrag::Idle,
        }
    }

    pub fn canvas(&self) -> Dimensions {
        self.canvas
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn drag_state(&self) -> CropDrag {
        self.drag
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, CropDrag::Dragging { .. })
    }

    /// Idle → Dragging
    pub fn begin(&mut self, handle: CropHandle, x: f64, y: f64) {
        self.drag = CropDrag::Dragging {
            handle,
            pointer_start: (x, y),
            rect_start: self.rect,
        };
    }

    /// Move the pointer; ignored unless dragging
    pub fn drag_to(&mut self, x: f64, y: f64) -> Rect {
        if let CropDrag::Dragging {
            handle,
            pointer_start,
            rect_start,
        } = self.drag
        {
            self.rect = drag_rect(
                rect_start,
                handle,
                x - pointer_start.0,
                y - pointer_start.1,
                self.canvas,
            );
        }
        self.rect
    }

    /// Dragging → Idle, keeping the current rectangle
    pub fn end(&mut self) -> Rect {
        self.drag = CropDrag::Idle;
        self.rect
    }

    /// Dragging → Idle, restoring the rectangle from before the drag
    pub fn cancel(&mut self) -> Rect {
        if let CropDrag::Dragging { rect_start, .. } = self.drag {
            self.rect = rect_start;
        }
        self.drag = CropDrag::Idle;
        self.rect
    }

    /// Rectangle normalized against the canvas
    pub fn normalized(&self) -> CropArea {
        CropArea::from_pixels(self.rect, self.canvas)
    }
}
