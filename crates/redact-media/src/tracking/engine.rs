use image::RgbImage;
use redact_models::BoundingBox;
use std::fmt;
use tracing::{debug, trace};

use super::visual::{TemplateTracker, VisualTracker};
use super::TrackerConfig;

/// Builds a fresh visual tracker for a new or re-anchored track.
pub type TrackerFactory = Box<dyn Fn() -> Box<dyn VisualTracker> + Send>;

/// A single tracked face.
pub struct Track {
    /// Identifier, unique within one engine instance
    pub id: u64,
    /// Last known position
    pub bbox: BoundingBox,
    /// Consecutive frames without a matching detection
    pub missed_frames: u32,
    tracker: Option<Box<dyn VisualTracker>>,
}

impl Track {
    /// Whether a visual tracker is currently anchored on this track.
    pub fn has_visual_tracker(&self) -> bool {
        self.tracker.is_some()
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("bbox", &self.bbox)
            .field("missed_frames", &self.missed_frames)
            .field("has_visual_tracker", &self.tracker.is_some())
            .finish()
    }
}

/// Score a detection against a track's box.
///
/// Overlap of at least `iou_threshold` scores `IoU + 1`, so it always beats
/// the center-distance path, which scores in `(0, 1]`. Returns `None` when
/// the detection is not eligible for this track.
pub fn association_score(
    track: &BoundingBox,
    detection: &BoundingBox,
    config: &TrackerConfig,
) -> Option<f64> {
    let iou = track.iou(detection);
    if iou >= config.iou_threshold {
        return Some(iou + 1.0);
    }

    let avg_dim = (track.width + track.height + detection.width + detection.height) as f64 / 4.0;
    let max_distance = avg_dim * config.distance_factor;
    let distance = track.center_distance(detection);

    (max_distance > 0.0 && distance < max_distance).then(|| 1.0 - distance / max_distance)
}

/// Greedy detection-to-track association with coasting visual trackers.
///
/// One engine serves one job: IDs start at 0 and are never reused.
pub struct TrackAssociationEngine {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_track_id: u64,
    factory: TrackerFactory,
}

impl TrackAssociationEngine {
    /// Create an engine using [`TemplateTracker`] for coasting.
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_tracker_factory(config, Box::new(|| Box::new(TemplateTracker::new())))
    }

    /// Create an engine with a custom visual tracker.
    pub fn with_tracker_factory(config: TrackerConfig, factory: TrackerFactory) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_track_id: 0,
            factory,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Live tracks in creation order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Number of tracks ever created, which is also the next ID.
    pub fn tracks_created(&self) -> u64 {
        self.next_track_id
    }

    /// Drop every track and restart IDs at 0.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_track_id = 0;
    }

    /// Advance one frame and return the regions to redact.
    pub fn update(&mut self, frame: &RgbImage, detections: &[BoundingBox]) -> Vec<BoundingBox> {
        self.associate(frame, detections);
        self.redaction_regions()
    }

    /// Current track boxes grown by the redaction ratio.
    pub fn redaction_regions(&self) -> Vec<BoundingBox> {
        self.tracks
            .iter()
            .map(|t| t.bbox.expand(self.config.expand_ratio))
            .collect()
    }

    /// Run one association step without producing regions.
    pub fn associate(&mut self, frame: &RgbImage, detections: &[BoundingBox]) {
        let (fw, fh) = frame.dimensions();

        // Coast every track on its visual tracker first.
        for track in &mut self.tracks {
            let Some(tracker) = track.tracker.as_mut() else {
                continue;
            };
            match tracker.update(frame) {
                Ok(Some(bbox)) => track.bbox = bbox,
                Ok(None) => trace!(track_id = track.id, "Visual tracker lost target"),
                Err(e) => trace!(track_id = track.id, error = %e, "Visual tracker update failed"),
            }
        }

        // Greedy matching in track order.
        let mut claimed = vec![false; detections.len()];
        let mut matched = vec![false; self.tracks.len()];

        for (t_idx, track) in self.tracks.iter_mut().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            for (d_idx, det) in detections.iter().enumerate() {
                if claimed[d_idx] {
                    continue;
                }
                if let Some(score) = association_score(&track.bbox, det, &self.config) {
                    if best.map_or(true, |(_, s)| score > s) {
                        best = Some((d_idx, score));
                    }
                }
            }

            if let Some((d_idx, _)) = best {
                claimed[d_idx] = true;
                matched[t_idx] = true;
                track.bbox = detections[d_idx];
                track.missed_frames = 0;
                track.tracker = anchor_tracker(&self.factory, frame, track.bbox, fw, fh);
            }
        }

        for (track, hit) in self.tracks.iter_mut().zip(&matched) {
            if !hit {
                track.missed_frames += 1;
            }
        }

        for (d_idx, det) in detections.iter().enumerate() {
            if claimed[d_idx] {
                continue;
            }
            let id = self.next_track_id;
            self.next_track_id += 1;
            debug!(track_id = id, x = det.x, y = det.y, w = det.width, h = det.height, "New track");
            self.tracks.push(Track {
                id,
                bbox: *det,
                missed_frames: 0,
                tracker: anchor_tracker(&self.factory, frame, *det, fw, fh),
            });
        }

        let max_missed = self.config.max_missed_frames;
        self.tracks.retain(|t| {
            let keep = t.missed_frames < max_missed;
            if !keep {
                debug!(track_id = t.id, "Track retired");
            }
            keep
        });
    }
}

/// Build and initialize a tracker on the frame-clamped box; failures leave
/// the track without one.
fn anchor_tracker(
    factory: &TrackerFactory,
    frame: &RgbImage,
    bbox: BoundingBox,
    fw: u32,
    fh: u32,
) -> Option<Box<dyn VisualTracker>> {
    let mut tracker = factory();
    match tracker.init(frame, bbox.clamp_to_frame(fw, fh)) {
        Ok(()) => Some(tracker),
        Err(e) => {
            trace!(error = %e, "Visual tracker init failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MediaError, MediaResult};
    use image::Rgb;

    fn blank() -> RgbImage {
        RgbImage::from_pixel(640, 480, Rgb([0, 0, 0]))
    }

    fn no_coast() -> TrackAssociationEngine {
        TrackAssociationEngine::with_tracker_factory(
            TrackerConfig::default(),
            Box::new(|| Box::new(FailingTracker)),
        )
    }

    struct FailingTracker;

    impl VisualTracker for FailingTracker {
        fn init(&mut self, _: &RgbImage, _: BoundingBox) -> MediaResult<()> {
            Err(MediaError::tracker_failed("unsupported"))
        }

        fn update(&mut self, _: &RgbImage) -> MediaResult<Option<BoundingBox>> {
            Err(MediaError::tracker_failed("unsupported"))
        }
    }

    /// Tracker that always reports the same fixed box.
    struct PinnedTracker(BoundingBox);

    impl VisualTracker for PinnedTracker {
        fn init(&mut self, _: &RgbImage, _: BoundingBox) -> MediaResult<()> {
            Ok(())
        }

        fn update(&mut self, _: &RgbImage) -> MediaResult<Option<BoundingBox>> {
            Ok(Some(self.0))
        }
    }

    #[test]
    fn test_new_detections_get_sequential_ids() {
        let mut engine = no_coast();
        let frame = blank();
        engine.associate(
            &frame,
            &[BoundingBox::new(10, 10, 40, 40), BoundingBox::new(300, 200, 40, 40)],
        );
        let ids: Vec<u64> = engine.tracks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(engine.tracks().iter().all(|t| !t.has_visual_tracker()));
    }

    #[test]
    fn test_ids_are_per_engine() {
        let frame = blank();
        let det = [BoundingBox::new(10, 10, 40, 40)];

        let mut first = no_coast();
        first.associate(&frame, &det);
        first.associate(&frame, &[]);
        first.associate(&frame, &[BoundingBox::new(400, 300, 40, 40)]);
        assert_eq!(first.tracks().last().map(|t| t.id), Some(1));

        let mut second = no_coast();
        second.associate(&frame, &det);
        assert_eq!(second.tracks()[0].id, 0);

        first.reset();
        first.associate(&frame, &det);
        assert_eq!(first.tracks()[0].id, 0);
    }

    #[test]
    fn test_iou_path_beats_closer_decoy() {
        let mut engine = no_coast();
        let frame = blank();
        engine.associate(&frame, &[BoundingBox::new(100, 100, 50, 50)]);

        // The sliver's center is nearer, but its overlap is under the IoU
        // threshold so it can only score on the distance path.
        let overlapping = BoundingBox::new(105, 100, 50, 50);
        let decoy = BoundingBox::new(127, 100, 1, 50);
        assert!(
            decoy.center_distance(&BoundingBox::new(100, 100, 50, 50))
                < overlapping.center_distance(&BoundingBox::new(100, 100, 50, 50))
        );
        engine.associate(&frame, &[decoy, overlapping]);

        let track = &engine.tracks()[0];
        assert_eq!(track.id, 0);
        assert_eq!(track.bbox, overlapping);
        assert_eq!(track.missed_frames, 0);
        assert_eq!(engine.tracks()[1].bbox, decoy);
    }

    #[test]
    fn test_distance_path_matches_nearby_box() {
        let mut engine = no_coast();
        let frame = blank();
        engine.associate(&frame, &[BoundingBox::new(100, 100, 40, 40)]);

        // No overlap, centers 50px apart, threshold 1.5 * 40 = 60.
        let det = BoundingBox::new(150, 100, 40, 40);
        engine.associate(&frame, &[det]);

        assert_eq!(engine.tracks().len(), 1);
        assert_eq!(engine.tracks()[0].id, 0);
        assert_eq!(engine.tracks()[0].bbox, det);
    }

    #[test]
    fn test_far_detection_spawns_new_track() {
        let mut engine = no_coast();
        let frame = blank();
        engine.associate(&frame, &[BoundingBox::new(0, 0, 40, 40)]);
        engine.associate(&frame, &[BoundingBox::new(500, 400, 40, 40)]);

        assert_eq!(engine.tracks().len(), 2);
        assert_eq!(engine.tracks()[0].missed_frames, 1);
        assert_eq!(engine.tracks()[1].id, 1);
    }

    #[test]
    fn test_greedy_order_first_track_claims() {
        let mut engine = no_coast();
        let frame = blank();
        engine.associate(
            &frame,
            &[BoundingBox::new(100, 100, 50, 50), BoundingBox::new(110, 100, 50, 50)],
        );
        assert_eq!(engine.tracks().len(), 2);

        // Single detection between both: track 0 is processed first and wins.
        engine.associate(&frame, &[BoundingBox::new(108, 100, 50, 50)]);
        assert_eq!(engine.tracks()[0].missed_frames, 0);
        assert_eq!(engine.tracks()[1].missed_frames, 1);
    }

    #[test]
    fn test_equal_scores_pick_earliest_detection() {
        let config = TrackerConfig::default();
        let track = BoundingBox::new(100, 100, 50, 50);
        let left = BoundingBox::new(95, 100, 50, 50);
        let right = BoundingBox::new(105, 100, 50, 50);
        assert_eq!(
            association_score(&track, &left, &config),
            association_score(&track, &right, &config)
        );

        let mut engine = no_coast();
        let frame = blank();
        engine.associate(&frame, &[track]);
        engine.associate(&frame, &[left, right]);
        assert_eq!(engine.tracks()[0].bbox, left);
    }

    #[test]
    fn test_missed_frames_reset_on_match() {
        let mut engine = no_coast();
        let frame = blank();
        let face = BoundingBox::new(200, 200, 60, 60);
        engine.associate(&frame, &[face]);

        for expected in 1..=5 {
            engine.associate(&frame, &[]);
            assert_eq!(engine.tracks()[0].missed_frames, expected);
        }

        engine.associate(&frame, &[face]);
        assert_eq!(engine.tracks()[0].missed_frames, 0);
        assert_eq!(engine.tracks()[0].id, 0);
    }

    #[test]
    fn test_track_survives_until_twentieth_miss() {
        let mut engine = no_coast();
        let frame = blank();
        engine.associate(&frame, &[BoundingBox::new(200, 200, 60, 60)]);

        for frame_no in 1..=25u32 {
            engine.associate(&frame, &[]);
            if frame_no < 20 {
                assert_eq!(engine.tracks().len(), 1, "dropped early at frame {frame_no}");
                assert_eq!(engine.tracks()[0].missed_frames, frame_no);
            } else {
                assert!(engine.tracks().is_empty(), "still alive at frame {frame_no}");
            }
        }
    }

    #[test]
    fn test_visual_tracker_moves_coasting_track() {
        let pinned = BoundingBox::new(300, 300, 60, 60);
        let mut engine = TrackAssociationEngine::with_tracker_factory(
            TrackerConfig::default(),
            Box::new(move || Box::new(PinnedTracker(pinned))),
        );
        let frame = blank();
        engine.associate(&frame, &[BoundingBox::new(100, 100, 60, 60)]);
        assert!(engine.tracks()[0].has_visual_tracker());

        engine.associate(&frame, &[]);
        let track = &engine.tracks()[0];
        assert_eq!(track.bbox, pinned);
        assert_eq!(track.missed_frames, 1);
    }

    #[test]
    fn test_regions_are_expanded() {
        let mut engine = no_coast();
        let frame = blank();
        let regions = engine.update(&frame, &[BoundingBox::new(100, 100, 50, 40)]);
        assert_eq!(regions, vec![BoundingBox::new(85, 88, 80, 64)]);
    }

    #[test]
    fn test_out_of_frame_detection_is_tracked() {
        let mut engine = TrackAssociationEngine::new(TrackerConfig::default());
        let frame = blank();
        engine.associate(&frame, &[BoundingBox::new(620, 470, 50, 50)]);
        assert_eq!(engine.tracks().len(), 1);
        assert_eq!(engine.tracks()[0].bbox, BoundingBox::new(620, 470, 50, 50));
    }
}
