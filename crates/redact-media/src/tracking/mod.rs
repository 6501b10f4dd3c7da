//! Multi-object face tracking.
//!
//! [`TrackAssociationEngine`] turns per-frame detections into stable track
//! identities. Each track carries an optional short-horizon
//! [`VisualTracker`] that lets it coast between detections.

mod engine;
mod visual;

pub use engine::{association_score, Track, TrackAssociationEngine, TrackerFactory};
pub use visual::{TemplateTracker, VisualTracker};

use serde::{Deserialize, Serialize};

/// Association thresholds for the tracking engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Minimum IoU for the overlap path
    pub iou_threshold: f64,
    /// Multiplier on the mean box dimension for the center-distance path
    pub distance_factor: f64,
    /// A track is dropped once it misses this many consecutive frames
    pub max_missed_frames: u32,
    /// Total growth applied to each box before redaction
    pub expand_ratio: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.15,
            distance_factor: 1.5,
            max_missed_frames: 20,
            expand_ratio: redact_models::rect::REDACTION_EXPAND_RATIO,
        }
    }
}
