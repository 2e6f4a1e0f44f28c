use crate::rect::Rect;
use serde::Deserialize;

/*------------------------------------------------------------------------------
Detection struct
------------------------------------------------------------------------------*/

/// One person observation produced by the upstream detector for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub rect: Rect<f64>,
    pub prob: f64,
}

impl Detection {
    pub fn new(rect: Rect<f64>, prob: f64) -> Self {
        Self { rect, prob }
    }

    /// Build from the detector's `[x1, y1, x2, y2]` pixel box.
    pub fn from_bbox(bbox: [f64; 4], prob: f64) -> Self {
        Self::new(Rect::from_xyxy(bbox[0], bbox[1], bbox[2], bbox[3]), prob)
    }

    pub fn get_rect(&self) -> &Rect<f64> {
        &self.rect
    }

    pub fn get_prob(&self) -> f64 {
        self.prob
    }
}

/*------------------------------------------------------------------------------
FrameShape struct
------------------------------------------------------------------------------*/

/// Pixel dimensions of the frame the detections were taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FrameShape {
    pub height: u32,
    pub width: u32,
}

impl FrameShape {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// Map a pixel coordinate into [-1, 1] on both axes.
    pub(crate) fn normalize(&self, x: f64, y: f64) -> (f64, f64) {
        let width = f64::from(self.width.max(1));
        let height = f64::from(self.height.max(1));
        ((x / width) * 2.0 - 1.0, (y / height) * 2.0 - 1.0)
    }
}
