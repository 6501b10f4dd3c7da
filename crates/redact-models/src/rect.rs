use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Growth applied to a face box before redaction (30% per axis per side).
pub const REDACTION_EXPAND_RATIO: f64 = 0.6;

/// Axis-aligned integer pixel rectangle `(x, y, w, h)`.
///
/// Coordinates may be negative or extend past the frame while a box is in
/// flight (detector output, expanded regions); [`BoundingBox::clip_to`] and
/// [`BoundingBox::clamp_to_frame`] bring it back inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: i32,
    /// Top edge y-coordinate
    pub y: i32,
    /// Box width
    pub width: i32,
    /// Box height
    pub height: i32,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Right edge x-coordinate (exclusive).
    #[inline]
    pub fn x2(&self) -> i32 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate (exclusive).
    #[inline]
    pub fn y2(&self) -> i32 {
        self.y + self.height
    }

    /// Box center in floating point pixels.
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Box area in pixels; zero for degenerate boxes.
    #[inline]
    pub fn area(&self) -> i64 {
        if self.is_degenerate() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    /// A box with no positive width or height.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Compute Intersection over Union with another box.
    ///
    /// Returns 0.0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        if self.is_degenerate() || other.is_degenerate() {
            return 0.0;
        }

        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) as i64 * (y2 - y1) as i64;
        let union = self.area() + other.area() - intersection;

        if union > 0 {
            intersection as f64 / union as f64
        } else {
            0.0
        }
    }

    /// Euclidean distance between the two box centers.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Grow the box around its center by `ratio` of its size.
    ///
    /// Each side moves out by `trunc(dim * ratio / 2)`, so a ratio of 0.6
    /// adds 30% of the width on the left and 30% on the right.
    pub fn expand(&self, ratio: f64) -> BoundingBox {
        let grow_w = (self.width as f64 * ratio / 2.0) as i32;
        let grow_h = (self.height as f64 * ratio / 2.0) as i32;
        BoundingBox {
            x: self.x - grow_w,
            y: self.y - grow_h,
            width: self.width + grow_w * 2,
            height: self.height + grow_h * 2,
        }
    }

    /// The region actually blurred for a face box.
    pub fn expand_for_redaction(&self) -> BoundingBox {
        self.expand(REDACTION_EXPAND_RATIO)
    }

    /// Intersect with the frame `[0, width) x [0, height)`.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn clip_to(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.x2().min(frame_width.min(i32::MAX as u32) as i32);
        let y2 = self.y2().min(frame_height.min(i32::MAX as u32) as i32);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
    }

    /// Force the box inside the frame, keeping at least one pixel per axis.
    ///
    /// The origin is pinned to the last valid pixel and the size shrunk to
    /// what remains, which is what visual trackers expect as an anchor.
    pub fn clamp_to_frame(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let fw = frame_width.clamp(1, i32::MAX as u32) as i32;
        let fh = frame_height.clamp(1, i32::MAX as u32) as i32;

        let x = self.x.clamp(0, fw - 1);
        let y = self.y.clamp(0, fh - 1);
        let width = self.width.min(fw - x).max(1);
        let height = self.height.min(fh - y).max(1);

        BoundingBox { x, y, width, height }
    }
}
