//! Frame-level metrics emitted by the redaction pipeline.

use metrics::counter;

/// Metric names.
pub mod names {
    pub const FRAMES_PROCESSED: &str = "redact_frames_processed_total";
    pub const FRAMES_SKIPPED: &str = "redact_frames_skipped_total";
    pub const REMUX_FALLBACKS: &str = "redact_remux_fallbacks_total";
}

pub(crate) fn record_frame_processed() {
    counter!(names::FRAMES_PROCESSED).increment(1);
}

pub(crate) fn record_frame_skipped(reason: &'static str) {
    counter!(names::FRAMES_SKIPPED, "reason" => reason).increment(1);
}

pub(crate) fn record_remux_fallback() {
    counter!(names::REMUX_FALLBACKS).increment(1);
}
