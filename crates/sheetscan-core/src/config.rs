//! Configuration for the scan pipeline.
//!
//! All thresholds and tolerances live in an explicit [`ScanConfig`] threaded
//! into each component's entry point. There is no ambient or global tuning
//! state, so concurrent scans with different parameters are possible.

use std::time::Duration;

/// Pipeline-level configuration with documented defaults.
///
/// Immutable after the `Scanner` is constructed. Use the builder for
/// ergonomic construction.
///
/// # Example
/// ```
/// use sheetscan_core::config::ScanConfig;
///
/// let config = ScanConfig::builder()
///     .fill_threshold(0.4)
///     .question_flag_confidence(0.6)
///     .build();
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ScanConfig {
    // Fiducial detection parameters
    /// Minimum pixel count for a marker's outer component (default: 64).
    pub marker_min_area: u32,
    /// Maximum bounding-box aspect ratio for a marker component (default: 1.6).
    pub marker_max_aspect: f32,
    /// Minimum bounding-box fill ratio for the outer ring component (default: 0.15).
    pub marker_fill_min: f32,
    /// Maximum bounding-box fill ratio for the outer ring component (default: 0.92).
    /// Excludes solid blobs such as fully filled bubbles.
    pub marker_fill_max: f32,
    /// Accepted range of inner-square area relative to the outer ring's pixel
    /// count (defaults: 0.08 to 0.8).
    pub marker_inner_ratio_min: f64,
    /// Upper bound of the inner/outer area ratio.
    pub marker_inner_ratio_max: f64,
    /// Maximum offset between inner and outer centroids, as a fraction of the
    /// outer bounding-box size (default: 0.3).
    pub marker_center_tolerance: f64,
    /// Search radius for matching auxiliary fiducials to their projected
    /// canonical positions, as a multiple of the fiducial size (default: 1.5).
    pub fiducial_match_radius: f64,
    /// Maximum geometric inconsistency of the corner markers, as a fraction
    /// of the detected corner-quad diagonal (default: 0.01). The consistency
    /// fit spreads a single-marker shift over all four corners, so the
    /// smallest detectable shift is roughly four times this fraction.
    pub fiducial_residual_tolerance: f64,
    /// Minimum sine of any corner-quad angle; below this the configuration is
    /// treated as near-collinear (default: 0.1).
    pub min_corner_angle_sin: f64,

    // Binarization parameters
    /// Window radius for integral-image adaptive thresholding (default: 7).
    pub adaptive_radius: usize,
    /// Constant subtracted from the local mean in adaptive thresholding (default: 4).
    pub adaptive_constant: i16,
    /// Minimum intensity range within a region sample for it to contain ink
    /// at all; below this the sample is treated as blank (default: 30).
    pub min_sample_contrast: u8,

    // Mark detection parameters
    /// Interior dark-pixel ratio above which a bubble counts as filled (default: 0.35).
    pub fill_threshold: f64,
    /// Distance from `fill_threshold` at which confidence saturates to 1.0
    /// (default: 0.25).
    pub fill_confidence_scale: f64,
    /// Erosion passes applied before measuring the fill ratio, discounting
    /// the bubble's printed outline (default: 1).
    pub erode_iterations: usize,
    /// Fill-ratio confidence below which the shape fallback strategy runs
    /// (default: 0.3).
    pub fallback_trigger_confidence: f64,
    /// Accepted relative deviation of a detected circular blob's diameter
    /// from the expected bubble diameter (default: 0.4).
    pub shape_diameter_tolerance: f64,
    /// Half-side of a bubble's sample window as a multiple of its radius
    /// (default: 1.6).
    pub sample_scale: f64,

    // Identifier recognition parameters
    /// Minimum pixel count for a component to count as part of a digit
    /// stroke (default: 12).
    pub digit_min_pixels: u32,
    /// Dark fraction above which a glyph-grid cell is set (default: 0.35).
    pub digit_cell_fill: f64,

    // Quality assessment parameters
    /// Questions with confidence below this are flagged for review (default: 0.5).
    pub question_flag_confidence: f64,
    /// Sheet-level flag when more than this fraction of questions is flagged
    /// (default: 0.25).
    pub sheet_flag_fraction: f64,
    /// Sheet-level flag when the identifier field confidence falls below
    /// this (default: 0.5).
    pub identifier_flag_confidence: f64,

    // Resource parameters
    /// Wall-clock budget per scan; `None` disables the deadline (default: 5s).
    pub timeout: Option<Duration>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            marker_min_area: 64,
            marker_max_aspect: 1.6,
            marker_fill_min: 0.15,
            marker_fill_max: 0.92,
            marker_inner_ratio_min: 0.08,
            marker_inner_ratio_max: 0.8,
            marker_center_tolerance: 0.3,
            fiducial_match_radius: 1.5,
            fiducial_residual_tolerance: 0.01,
            min_corner_angle_sin: 0.1,
            adaptive_radius: 7,
            adaptive_constant: 4,
            min_sample_contrast: 30,
            fill_threshold: 0.35,
            fill_confidence_scale: 0.25,
            erode_iterations: 1,
            fallback_trigger_confidence: 0.3,
            shape_diameter_tolerance: 0.4,
            sample_scale: 1.6,
            digit_min_pixels: 12,
            digit_cell_fill: 0.35,
            question_flag_confidence: 0.5,
            sheet_flag_fraction: 0.25,
            identifier_flag_confidence: 0.5,
            timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl ScanConfig {
    /// Create a new builder for `ScanConfig`.
    #[must_use]
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }
}

/// Builder for [`ScanConfig`]. Unset fields fall back to the documented
/// defaults.
#[derive(Default)]
pub struct ScanConfigBuilder {
    marker_min_area: Option<u32>,
    marker_max_aspect: Option<f32>,
    fiducial_residual_tolerance: Option<f64>,
    adaptive_radius: Option<usize>,
    adaptive_constant: Option<i16>,
    fill_threshold: Option<f64>,
    fill_confidence_scale: Option<f64>,
    erode_iterations: Option<usize>,
    fallback_trigger_confidence: Option<f64>,
    sample_scale: Option<f64>,
    question_flag_confidence: Option<f64>,
    sheet_flag_fraction: Option<f64>,
    identifier_flag_confidence: Option<f64>,
    timeout: Option<Option<Duration>>,
}

impl ScanConfigBuilder {
    /// Set the minimum marker component area.
    #[must_use]
    pub fn marker_min_area(mut self, area: u32) -> Self {
        self.marker_min_area = Some(area);
        self
    }

    /// Set the maximum marker aspect ratio.
    #[must_use]
    pub fn marker_max_aspect(mut self, aspect: f32) -> Self {
        self.marker_max_aspect = Some(aspect);
        self
    }

    /// Set the corner consistency tolerance.
    #[must_use]
    pub fn fiducial_residual_tolerance(mut self, tolerance: f64) -> Self {
        self.fiducial_residual_tolerance = Some(tolerance);
        self
    }

    /// Set the adaptive threshold window radius.
    #[must_use]
    pub fn adaptive_radius(mut self, radius: usize) -> Self {
        self.adaptive_radius = Some(radius);
        self
    }

    /// Set the constant subtracted from the local mean.
    #[must_use]
    pub fn adaptive_constant(mut self, c: i16) -> Self {
        self.adaptive_constant = Some(c);
        self
    }

    /// Set the fill-ratio threshold for a bubble to count as filled.
    #[must_use]
    pub fn fill_threshold(mut self, threshold: f64) -> Self {
        self.fill_threshold = Some(threshold);
        self
    }

    /// Set the distance from the fill threshold at which confidence saturates.
    #[must_use]
    pub fn fill_confidence_scale(mut self, scale: f64) -> Self {
        self.fill_confidence_scale = Some(scale);
        self
    }

    /// Set the number of erosion passes before fill measurement.
    #[must_use]
    pub fn erode_iterations(mut self, iterations: usize) -> Self {
        self.erode_iterations = Some(iterations);
        self
    }

    /// Set the confidence below which the shape fallback runs.
    #[must_use]
    pub fn fallback_trigger_confidence(mut self, confidence: f64) -> Self {
        self.fallback_trigger_confidence = Some(confidence);
        self
    }

    /// Set the sample window half-side as a multiple of the bubble radius.
    #[must_use]
    pub fn sample_scale(mut self, scale: f64) -> Self {
        self.sample_scale = Some(scale);
        self
    }

    /// Set the per-question review flag threshold.
    #[must_use]
    pub fn question_flag_confidence(mut self, confidence: f64) -> Self {
        self.question_flag_confidence = Some(confidence);
        self
    }

    /// Set the flagged-question fraction that triggers a sheet-level flag.
    #[must_use]
    pub fn sheet_flag_fraction(mut self, fraction: f64) -> Self {
        self.sheet_flag_fraction = Some(fraction);
        self
    }

    /// Set the identifier confidence that triggers a sheet-level flag.
    #[must_use]
    pub fn identifier_flag_confidence(mut self, confidence: f64) -> Self {
        self.identifier_flag_confidence = Some(confidence);
        self
    }

    /// Set the wall-clock budget per scan. `None` disables the deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the configuration, using defaults for unset fields.
    #[must_use]
    pub fn build(self) -> ScanConfig {
        let d = ScanConfig::default();
        ScanConfig {
            marker_min_area: self.marker_min_area.unwrap_or(d.marker_min_area),
            marker_max_aspect: self.marker_max_aspect.unwrap_or(d.marker_max_aspect),
            fiducial_residual_tolerance: self
                .fiducial_residual_tolerance
                .unwrap_or(d.fiducial_residual_tolerance),
            adaptive_radius: self.adaptive_radius.unwrap_or(d.adaptive_radius),
            adaptive_constant: self.adaptive_constant.unwrap_or(d.adaptive_constant),
            fill_threshold: self.fill_threshold.unwrap_or(d.fill_threshold),
            fill_confidence_scale: self
                .fill_confidence_scale
                .unwrap_or(d.fill_confidence_scale),
            erode_iterations: self.erode_iterations.unwrap_or(d.erode_iterations),
            fallback_trigger_confidence: self
                .fallback_trigger_confidence
                .unwrap_or(d.fallback_trigger_confidence),
            sample_scale: self.sample_scale.unwrap_or(d.sample_scale),
            question_flag_confidence: self
                .question_flag_confidence
                .unwrap_or(d.question_flag_confidence),
            sheet_flag_fraction: self.sheet_flag_fraction.unwrap_or(d.sheet_flag_fraction),
            identifier_flag_confidence: self
                .identifier_flag_confidence
                .unwrap_or(d.identifier_flag_confidence),
            timeout: self.timeout.unwrap_or(d.timeout),
            ..d
        }
    }
}
