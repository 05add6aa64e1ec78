//! Core recognition and grading logic for the sheetscan library.
//!
//! Sheetscan turns a photographed or scanned answer sheet into a graded
//! score report, using printed nested-square fiducial markers to recover the
//! page geometry before any region is read.
//!
//! # Architecture Overview
//!
//! The pipeline is a fixed sequence of stages; each consumes the previous
//! stage's output and geometry is verified before anything downstream runs:
//!
//! 1. **Geometric Normalization**:
//!    - Integral-image adaptive thresholding.
//!    - Connected components labeling (Union-Find) and nested-square
//!      fiducial detection.
//!    - Order-independent corner classification, degeneracy checks, and a
//!      perspective warp into the template's canonical frame.
//!
//! 2. **Region Sampling**:
//!    - Pure mapping from template coordinates to pixel neighborhoods.
//!
//! 3. **Mark & Identifier Detection**:
//!    - Fill-ratio bubble classification with a shape-search fallback.
//!    - Glyph-grid digit recognition with decision-margin confidence.
//!
//! 4. **Quality Assessment & Grading**:
//!    - Review flags for low-confidence and multiple-mark questions.
//!    - Weighted scoring against an answer key.
//!
//! # Configuration
//!
//! All thresholds live in [`config::ScanConfig`], immutable after the
//! [`Scanner`] is constructed.
//!
//! # Example
//!
//! ```
//! use sheetscan_core::{Scanner, config::ScanConfig};
//! use sheetscan_core::template::AnswerKey;
//! use sheetscan_core::test_utils::{grid_template, SheetBuilder};
//!
//! let template = grid_template(2, 4, 0);
//! let key = AnswerKey::from_pairs(&[(1, 0), (2, 3)]);
//! let sheet = SheetBuilder::new(&template).fill(1, 0).fill(2, 1).build();
//!
//! let mut scanner = Scanner::new();
//! let report = scanner
//!     .scan(&sheet.as_view(), &template, &key)
//!     .expect("scan succeeds on a clean synthetic sheet");
//! assert!((report.score - 1.0).abs() < 1e-12);
//! ```

/// Configuration types for the scan pipeline.
pub mod config;
/// Error taxonomy for scan failures.
pub mod error;
/// Fiducial marker detection and corner classification.
pub mod fiducial;
/// Grading against an answer key.
pub mod grade;
/// Homography estimation and perspective warping.
pub mod homography;
/// Identifier digit recognition.
pub mod identifier;
/// Image buffer abstractions.
pub mod image;
/// Bubble mark detection strategies and question resolution.
pub mod mark;
/// Geometric normalization into the canonical frame.
pub mod normalize;
/// Quality assessment and review flags.
pub mod quality;
/// Region sampling from the normalized image.
pub mod sample;
/// Connected components labeling using Union-Find.
pub mod segmentation;
/// Layout templates and answer keys.
pub mod template;
/// Utilities for testing and synthetic sheet generation.
pub mod test_utils;
/// Adaptive and fixed thresholding.
pub mod threshold;

use std::time::{Duration, Instant};

use bumpalo::Bump;
use rayon::prelude::*;
use tracing::info_span;

pub use crate::config::ScanConfig;
pub use crate::error::ScanError;
pub use crate::grade::ScoreReport;
pub use crate::image::{ImageView, RawCapture};
pub use crate::template::{AnswerKey, Template};

/// Pipeline-wide statistics for a single scan call.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    /// Time spent in geometric normalization in milliseconds.
    pub normalize_ms: f64,
    /// Time spent sampling regions in milliseconds.
    pub sampling_ms: f64,
    /// Time spent in mark and identifier detection in milliseconds.
    pub detection_ms: f64,
    /// Time spent in quality assessment and grading in milliseconds.
    pub grading_ms: f64,
    /// Total pipeline time in milliseconds.
    pub total_ms: f64,
    /// Fiducial candidates that passed the signature filters.
    pub num_candidates: usize,
    /// Correspondences used for the geometric transform.
    pub num_correspondences: usize,
    /// Region samples extracted.
    pub num_regions: usize,
    /// Questions flagged for review.
    pub num_flagged: usize,
}

/// The main entry point for scanning answer sheets.
///
/// The scanner holds reusable state (arena allocator) and its configuration
/// is fixed at construction time via [`ScanConfig`].
pub struct Scanner {
    arena: Bump,
    config: ScanConfig,
}

impl Scanner {
    /// Create a scanner with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ScanConfig::default())
    }

    /// Create a scanner with custom pipeline configuration.
    #[must_use]
    pub fn with_config(config: ScanConfig) -> Self {
        Self {
            arena: Bump::new(),
            config,
        }
    }

    /// The scanner's configuration.
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan a grayscale image against a template and answer key.
    pub fn scan(
        &mut self,
        img: &ImageView,
        template: &Template,
        key: &AnswerKey,
    ) -> Result<ScoreReport, ScanError> {
        self.scan_with_stats(img, template, key).map(|(r, _)| r)
    }

    /// Scan a raw multi-channel capture, converting to grayscale first.
    pub fn scan_capture(
        &mut self,
        capture: &RawCapture,
        template: &Template,
        key: &AnswerKey,
    ) -> Result<ScoreReport, ScanError> {
        let gray = capture.to_gray()?;
        self.scan(&gray.as_view(), template, key)
    }

    /// Scan with detailed timing statistics.
    pub fn scan_with_stats(
        &mut self,
        img: &ImageView,
        template: &Template,
        key: &AnswerKey,
    ) -> Result<(ScoreReport, PipelineStats), ScanError> {
        template.validate()?;

        let mut stats = PipelineStats::default();
        let start_total = Instant::now();
        let deadline = Deadline::new(self.config.timeout, start_total);

        self.arena.reset();

        // 1. Geometric normalization
        let start = Instant::now();
        let (normalized, norm_stats) = {
            let _span = info_span!("normalize").entered();
            normalize::normalize(img, template, &self.config, &self.arena)?
        };
        stats.normalize_ms = start.elapsed().as_secs_f64() * 1000.0;
        stats.num_candidates = norm_stats.num_candidates;
        stats.num_correspondences = norm_stats.num_correspondences;
        deadline.check()?;

        // 2. Region sampling
        let start = Instant::now();
        let sampled = {
            let _span = info_span!("sample").entered();
            sample::sample_regions(&normalized, template, &self.config)?
        };
        stats.sampling_ms = start.elapsed().as_secs_f64() * 1000.0;
        stats.num_regions = sampled.num_regions();
        deadline.check()?;

        // 3. Mark and identifier detection. Questions are independent, so
        // they classify in parallel.
        let start = Instant::now();
        let (questions, fields) = {
            let _span = info_span!("detect").entered();
            let questions: Vec<_> = sampled
                .questions
                .par_iter()
                .map(|q| {
                    let readings = q
                        .samples
                        .iter()
                        .map(|s| mark::classify_bubble(s, &self.config))
                        .collect();
                    mark::resolve_question(q.number, readings)
                })
                .collect();
            let fields: Vec<_> = sampled
                .fields
                .iter()
                .map(|f| identifier::recognize_field(f, &self.config))
                .collect();
            (questions, fields)
        };
        stats.detection_ms = start.elapsed().as_secs_f64() * 1000.0;
        deadline.check()?;

        // 4. Quality assessment and grading
        let start = Instant::now();
        let report = {
            let _span = info_span!("grade").entered();
            let quality = quality::assess(&questions, &fields, &self.config);
            stats.num_flagged = quality.question_flags.len();
            grade::grade(&questions, &fields, template, key, quality)
        };
        stats.grading_ms = start.elapsed().as_secs_f64() * 1000.0;

        stats.total_ms = start_total.elapsed().as_secs_f64() * 1000.0;
        Ok((report, stats))
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock budget checked at stage boundaries. Stages themselves are
/// bounded by the image and template sizes, so boundary checks are enough to
/// stop runaway scans without a watchdog thread.
struct Deadline {
    budget: Option<Duration>,
    start: Instant,
}

impl Deadline {
    fn new(budget: Option<Duration>, start: Instant) -> Self {
        Self { budget, start }
    }

    fn check(&self) -> Result<(), ScanError> {
        match self.budget {
            Some(budget) if self.start.elapsed() > budget => Err(ScanError::TimedOut {
                budget_ms: budget.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{SheetBuilder, grid_template};

    #[test]
    fn test_scan_clean_sheet() {
        let template = grid_template(3, 4, 0);
        let key = AnswerKey::from_pairs(&[(1, 0), (2, 1), (3, 2)]);
        let sheet = SheetBuilder::new(&template)
            .fill(1, 0)
            .fill(2, 1)
            .fill(3, 3)
            .build();

        let mut scanner = Scanner::new();
        let (report, stats) = scanner
            .scan_with_stats(&sheet.as_view(), &template, &key)
            .unwrap();
        assert!((report.score - 2.0).abs() < 1e-12);
        assert!((report.max_score - 3.0).abs() < 1e-12);
        assert!(stats.num_candidates >= 4);
        assert_eq!(stats.num_regions, 12);
    }

    #[test]
    fn test_invalid_template_rejected() {
        let mut template = grid_template(1, 4, 0);
        template.fiducials.truncate(3);
        let sheet = crate::image::GrayBuffer::filled(64, 64, 255);
        let mut scanner = Scanner::new();
        let err = scanner
            .scan(&sheet.as_view(), &template, &AnswerKey::default())
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidTemplate(_)));
    }

    #[test]
    fn test_zero_timeout_reported() {
        let template = grid_template(1, 4, 0);
        let sheet = SheetBuilder::new(&template).build();
        let config = ScanConfig::builder()
            .timeout(Some(Duration::ZERO))
            .build();
        let mut scanner = Scanner::with_config(config);
        let err = scanner
            .scan(&sheet.as_view(), &template, &AnswerKey::default())
            .unwrap_err();
        assert_eq!(err, ScanError::TimedOut { budget_ms: 0 });
    }
}
