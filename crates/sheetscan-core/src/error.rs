//! Error taxonomy for the scan pipeline.
//!
//! Geometry failures are fatal to a scan: no meaningful partial result exists
//! without a verified coordinate frame. Detection-level uncertainty is never
//! an error; it flows through as flagged results in the final report.

use crate::sample::RegionId;

/// Fatal pipeline errors. Low-confidence detections are not represented here.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    /// Fewer fiducial markers were detected than the four corner markers
    /// required to establish the page geometry.
    #[error("insufficient fiducial markers: found {found}, required {required}")]
    InsufficientMarkers {
        /// Number of marker candidates that passed the signature filters.
        found: usize,
        /// Minimum number of markers required (the four corners).
        required: usize,
    },

    /// Markers were found but their configuration is geometrically invalid
    /// (near-collinear corners or a marker inconsistent with the others),
    /// making the perspective transform unstable.
    #[error("degenerate marker geometry: {reason}")]
    GeometryDegenerate {
        /// Human-readable description of the failed consistency check.
        reason: String,
    },

    /// A template region maps outside the normalized image bounds. This is a
    /// template authoring problem, not a scan problem.
    #[error("template region {region:?} maps outside the normalized image")]
    RegionOutOfBounds {
        /// Identity of the offending region.
        region: RegionId,
    },

    /// The pipeline exceeded its wall-clock budget. Retryable by the caller.
    #[error("scan exceeded wall-clock budget of {budget_ms} ms")]
    TimedOut {
        /// The configured budget in milliseconds.
        budget_ms: u64,
    },

    /// The capture buffer is malformed (zero-sized, or inconsistent with its
    /// declared dimensions and channel count).
    #[error("invalid capture: {0}")]
    InvalidCapture(String),

    /// The template failed validation on ingestion.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
}
