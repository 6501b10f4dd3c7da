//! Soft-edged elliptical blur over face regions.

use image::{imageops, GrayImage, Luma, RgbImage};
use redact_models::BoundingBox;

/// Smallest blur kernel, in pixels.
pub const MIN_BLUR_KERNEL: u32 = 15;
/// Kernel used to feather the ellipse mask edge.
pub const MASK_FEATHER_KERNEL: u32 = 21;

/// Blur kernel for a region: a third of the shorter side, forced odd,
/// never below [`MIN_BLUR_KERNEL`].
pub fn blur_kernel_size(width: u32, height: u32) -> u32 {
    ((width.min(height) / 3) | 1).max(MIN_BLUR_KERNEL)
}

/// Gaussian sigma for an odd kernel size, using the usual
/// `0.3 * ((k - 1) * 0.5 - 1) + 0.8` rule.
pub fn kernel_sigma(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Paints blurred ellipses over regions of a frame.
#[derive(Debug, Clone)]
pub struct RegionRenderer {
    feather_sigma: f32,
}

impl Default for RegionRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionRenderer {
    pub fn new() -> Self {
        Self {
            feather_sigma: kernel_sigma(MASK_FEATHER_KERNEL),
        }
    }

    /// Redact every region in place. Returns how many were drawn.
    pub fn render_all(&self, frame: &mut RgbImage, regions: &[BoundingBox]) -> usize {
        regions.iter().filter(|r| self.render(frame, **r)).count()
    }

    /// Redact a single region in place.
    ///
    /// The region is clipped to the frame first; returns `false` when
    /// nothing of it is visible.
    pub fn render(&self, frame: &mut RgbImage, region: BoundingBox) -> bool {
        let (fw, fh) = frame.dimensions();
        let Some(clip) = region.clip_to(fw, fh) else {
            return false;
        };
        let (x, y, w, h) = (
            clip.x as u32,
            clip.y as u32,
            clip.width as u32,
            clip.height as u32,
        );

        let original = imageops::crop_imm(frame, x, y, w, h).to_image();
        let blurred = imageops::blur(&original, kernel_sigma(blur_kernel_size(w, h)));
        let mask = imageops::blur(&ellipse_mask(w, h), self.feather_sigma);

        for (i, j, px) in blurred.enumerate_pixels() {
            let alpha = mask.get_pixel(i, j).0[0] as f32 / 255.0;
            if alpha <= 0.0 {
                continue;
            }
            let src = original.get_pixel(i, j).0;
            let dst = frame.get_pixel_mut(x + i, y + j);
            for c in 0..3 {
                let v = src[c] as f32 * (1.0 - alpha) + px.0[c] as f32 * alpha;
                dst.0[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
        true
    }
}

/// Filled ellipse inscribed in a `w x h` box.
fn ellipse_mask(w: u32, h: u32) -> GrayImage {
    let cx = (w / 2) as f32;
    let cy = (h / 2) as f32;
    let ax = ((w / 2) as f32).max(0.5);
    let ay = ((h / 2) as f32).max(0.5);

    GrayImage::from_fn(w, h, |i, j| {
        let dx = (i as f32 - cx) / ax;
        let dy = (j as f32 - cy) / ay;
        if dx * dx + dy * dy <= 1.0 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn striped(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| {
            if (x / 2) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn test_blur_kernel_size() {
        assert_eq!(blur_kernel_size(300, 90), 31);
        assert_eq!(blur_kernel_size(30, 30), 15);
        assert_eq!(blur_kernel_size(200, 200), 67);
        assert_eq!(blur_kernel_size(1, 400), 15);
        for (w, h) in [(48, 100), (64, 64), (500, 121)] {
            assert_eq!(blur_kernel_size(w, h) % 2, 1);
        }
    }

    #[test]
    fn test_kernel_sigma() {
        assert!((kernel_sigma(21) - 3.5).abs() < 1e-6);
        assert!((kernel_sigma(15) - 2.6).abs() < 1e-6);
    }

    #[test]
    fn test_ellipse_mask_shape() {
        let mask = ellipse_mask(40, 20);
        assert_eq!(mask.get_pixel(20, 10).0[0], 255);
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        assert_eq!(mask.get_pixel(39, 19).0[0], 0);
    }

    #[test]
    fn test_out_of_frame_region_is_noop() {
        let mut frame = striped(64, 48);
        let before = frame.clone();
        let renderer = RegionRenderer::new();

        assert!(!renderer.render(&mut frame, BoundingBox::new(100, 100, 20, 20)));
        assert!(!renderer.render(&mut frame, BoundingBox::new(10, 10, 0, 20)));
        assert_eq!(frame, before);
    }

    #[test]
    fn test_render_changes_only_inside_region() {
        let mut frame = striped(120, 80);
        let before = frame.clone();
        let region = BoundingBox::new(30, 20, 60, 40);

        assert!(RegionRenderer::new().render(&mut frame, region));

        // Center of the ellipse is smoothed toward mid-gray.
        let center = frame.get_pixel(60, 40).0[0];
        assert!((60..=195).contains(&center), "center not blurred: {center}");

        for (x, y, px) in frame.enumerate_pixels() {
            let inside = (30..90).contains(&x) && (20..60).contains(&y);
            if !inside {
                assert_eq!(px, before.get_pixel(x, y), "pixel ({x},{y}) changed");
            }
        }
    }

    #[test]
    fn test_partially_visible_region_is_clipped() {
        let mut frame = striped(50, 50);
        let renderer = RegionRenderer::new();
        let drawn = renderer.render_all(
            &mut frame,
            &[BoundingBox::new(-20, -20, 50, 50), BoundingBox::new(60, 0, 10, 10)],
        );
        assert_eq!(drawn, 1);
    }

    #[test]
    fn test_uniform_region_is_unchanged() {
        let mut frame = RgbImage::from_pixel(40, 40, Rgb([120, 80, 40]));
        RegionRenderer::new().render(&mut frame, BoundingBox::new(5, 5, 30, 30));
        for px in frame.pixels() {
            for (got, want) in px.0.iter().zip([120u8, 80, 40]) {
                assert!(got.abs_diff(want) <= 1);
            }
        }
    }
}
