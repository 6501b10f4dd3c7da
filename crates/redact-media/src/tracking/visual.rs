use image::RgbImage;
use redact_models::BoundingBox;

use crate::error::{MediaError, MediaResult};

/// Short-horizon single-object tracker advanced once per frame.
///
/// `update` returns `Ok(None)` when the target is lost this frame. Callers
/// treat errors the same way: no position update for this frame.
pub trait VisualTracker: Send {
    /// Anchor the tracker on `anchor` in `frame`.
    fn init(&mut self, frame: &RgbImage, anchor: BoundingBox) -> MediaResult<()>;

    /// Locate the target in the next frame.
    fn update(&mut self, frame: &RgbImage) -> MediaResult<Option<BoundingBox>>;
}

/// Template samples per axis.
const TEMPLATE_SAMPLES: i32 = 32;
/// Search radius, in sample steps.
const SEARCH_STEPS: i32 = 4;
/// Templates flatter than this (max - min luma) cannot be tracked.
const MIN_CONTRAST: u8 = 12;
/// Mean absolute luma difference above which the target is considered lost.
const MAX_MEAN_DIFF: f64 = 24.0;

/// Sum-of-absolute-differences template matcher over a luma grid.
///
/// The template is a sparse grid of luma samples taken from the anchor box;
/// the step between samples scales with the box so cost stays bounded
/// regardless of face size.
#[derive(Debug, Default)]
pub struct TemplateTracker {
    state: Option<TemplateState>,
}

#[derive(Debug)]
struct TemplateState {
    bbox: BoundingBox,
    stride: i32,
    cols: i32,
    rows: i32,
    samples: Vec<u8>,
    frame_size: (u32, u32),
}

impl TemplateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tracked box, if initialized.
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.state.as_ref().map(|s| s.bbox)
    }
}

#[inline]
fn luma(frame: &RgbImage, x: i32, y: i32) -> u8 {
    let [r, g, b] = frame.get_pixel(x as u32, y as u32).0;
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

impl VisualTracker for TemplateTracker {
    fn init(&mut self, frame: &RgbImage, anchor: BoundingBox) -> MediaResult<()> {
        self.state = None;

        let (fw, fh) = frame.dimensions();
        let bbox = anchor
            .clip_to(fw, fh)
            .ok_or_else(|| MediaError::tracker_failed("anchor outside frame"))?;

        let stride = (bbox.width.max(bbox.height) / TEMPLATE_SAMPLES).max(1);
        let cols = (bbox.width / stride).max(1);
        let rows = (bbox.height / stride).max(1);

        let mut samples = Vec::with_capacity((cols * rows) as usize);
        for j in 0..rows {
            for i in 0..cols {
                samples.push(luma(frame, bbox.x + i * stride, bbox.y + j * stride));
            }
        }

        let (min, max) = samples
            .iter()
            .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if max.saturating_sub(min) < MIN_CONTRAST {
            return Err(MediaError::tracker_failed("template has no texture"));
        }

        self.state = Some(TemplateState {
            bbox,
            stride,
            cols,
            rows,
            samples,
            frame_size: (fw, fh),
        });
        Ok(())
    }

    fn update(&mut self, frame: &RgbImage) -> MediaResult<Option<BoundingBox>> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| MediaError::tracker_failed("tracker not initialized"))?;

        let (fw, fh) = frame.dimensions();
        if (fw, fh) != state.frame_size {
            return Err(MediaError::tracker_failed("frame size changed"));
        }

        let span_x = (state.cols - 1) * state.stride;
        let span_y = (state.rows - 1) * state.stride;
        let n = state.samples.len() as f64;

        // (0, 0) is scored first so a stationary target wins ties.
        let mut best: Option<(f64, i32, i32)> = None;
        let offsets = std::iter::once((0, 0)).chain(
            (-SEARCH_STEPS..=SEARCH_STEPS)
                .flat_map(|dy| (-SEARCH_STEPS..=SEARCH_STEPS).map(move |dx| (dx, dy)))
                .filter(|&(dx, dy)| dx != 0 || dy != 0),
        );

        for (dx, dy) in offsets {
            let x0 = state.bbox.x + dx * state.stride;
            let y0 = state.bbox.y + dy * state.stride;
            if x0 < 0 || y0 < 0 || x0 + span_x >= fw as i32 || y0 + span_y >= fh as i32 {
                continue;
            }

            let mut sad: u64 = 0;
            for j in 0..state.rows {
                for i in 0..state.cols {
                    let cur = luma(frame, x0 + i * state.stride, y0 + j * state.stride);
                    let tpl = state.samples[(j * state.cols + i) as usize];
                    sad += cur.abs_diff(tpl) as u64;
                }
            }
            let mean = sad as f64 / n;

            if best.map_or(true, |(b, _, _)| mean < b) {
                best = Some((mean, x0, y0));
            }
        }

        match best {
            Some((mean, x, y)) if mean <= MAX_MEAN_DIFF => {
                state.bbox = BoundingBox::new(x, y, state.bbox.width, state.bbox.height);
                Ok(Some(state.bbox))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Gray canvas with a high-contrast checkered square at (x, y).
    fn frame_with_patch(x: u32, y: u32, size: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(200, 160, Rgb([90, 90, 90]));
        for j in 0..size {
            for i in 0..size {
                let v = if (i / 4 + j / 4) % 2 == 0 { 250 } else { 10 };
                img.put_pixel(x + i, y + j, Rgb([v, v, v]));
            }
        }
        img
    }

    #[test]
    fn test_follows_moving_patch() {
        let mut tracker = TemplateTracker::new();
        tracker
            .init(&frame_with_patch(60, 50, 40), BoundingBox::new(60, 50, 40, 40))
            .unwrap();

        let moved = tracker.update(&frame_with_patch(63, 48, 40)).unwrap();
        assert_eq!(moved, Some(BoundingBox::new(63, 48, 40, 40)));
    }

    #[test]
    fn test_stationary_patch_stays_put() {
        let frame = frame_with_patch(60, 50, 40);
        let mut tracker = TemplateTracker::new();
        tracker.init(&frame, BoundingBox::new(60, 50, 40, 40)).unwrap();
        assert_eq!(
            tracker.update(&frame).unwrap(),
            Some(BoundingBox::new(60, 50, 40, 40))
        );
    }

    #[test]
    fn test_flat_template_fails_init() {
        let blank = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let mut tracker = TemplateTracker::new();
        assert!(tracker.init(&blank, BoundingBox::new(10, 10, 30, 30)).is_err());
        assert!(tracker.bbox().is_none());
        assert!(tracker.update(&blank).is_err());
    }

    #[test]
    fn test_lost_when_patch_disappears() {
        let mut tracker = TemplateTracker::new();
        tracker
            .init(&frame_with_patch(60, 50, 40), BoundingBox::new(60, 50, 40, 40))
            .unwrap();
        let blank = RgbImage::from_pixel(200, 160, Rgb([90, 90, 90]));
        assert_eq!(tracker.update(&blank).unwrap(), None);
    }
}
