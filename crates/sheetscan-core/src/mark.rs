//! Bubble mark detection: an ordered strategy chain classifies each sampled
//! option region, and a fixed resolution policy combines per-option readings
//! into a question-level detection.
//!
//! The primary strategy measures the interior dark-pixel ratio after eroding
//! the bubble's printed outline. When its confidence is low, a circular
//! shape search runs as a fallback. Resolution never collapses multiple
//! filled options into a guessed answer.

use bumpalo::Bump;
use serde::Serialize;

use crate::config::ScanConfig;
use crate::sample::RegionSample;
use crate::segmentation;
use crate::threshold;

/// Classification of a single option bubble.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BubbleReading {
    /// Whether the bubble is considered filled.
    pub filled: bool,
    /// Confidence in [0, 1]. Always produced, even on ambiguous readings.
    pub confidence: f64,
    /// Measured interior dark-pixel ratio (primary strategy), or the
    /// equivalent score of the strategy that produced this reading.
    pub fill_ratio: f64,
}

/// A single mark classification strategy. Strategies are chained in order;
/// each returns `None` when it cannot produce a reading for the sample.
pub trait MarkStrategy: Send + Sync {
    /// Strategy name for diagnostics.
    fn name(&self) -> &'static str;
    /// Classify one sampled bubble region.
    fn classify(&self, sample: &RegionSample, config: &ScanConfig) -> Option<BubbleReading>;
}

/// Primary strategy: binarize, erode the printed outline, and measure the
/// dark-pixel ratio inside the bubble's inscribed circle. Confidence scales
/// with the ratio's distance from the configured fill threshold.
pub struct FillRatioStrategy;

impl MarkStrategy for FillRatioStrategy {
    fn name(&self) -> &'static str {
        "fill-ratio"
    }

    fn classify(&self, sample: &RegionSample, config: &ScanConfig) -> Option<BubbleReading> {
        let hist = threshold::histogram(&sample.pixels);
        let (lo, hi) = intensity_range(&hist);
        if hi.saturating_sub(lo) < config.min_sample_contrast {
            // No ink at all: confidently blank.
            return Some(reading_from_ratio(0.0, config));
        }

        let level = threshold::otsu_level(&hist);
        let binary = threshold::binarize_fixed(&sample.pixels, level);
        let eroded =
            threshold::erode_ink(&binary, sample.width, sample.height, config.erode_iterations);

        let ratio = interior_dark_ratio(&eroded, sample);
        Some(reading_from_ratio(ratio, config))
    }
}

/// Fallback strategy: search the sample for a filled circular structure of
/// roughly the expected bubble radius. Used when the fill-ratio reading is
/// low-confidence, e.g. when the printed outline cannot be isolated.
pub struct ShapeStrategy;

impl MarkStrategy for ShapeStrategy {
    fn name(&self) -> &'static str {
        "shape"
    }

    fn classify(&self, sample: &RegionSample, config: &ScanConfig) -> Option<BubbleReading> {
        let hist = threshold::histogram(&sample.pixels);
        let (lo, hi) = intensity_range(&hist);
        if hi.saturating_sub(lo) < config.min_sample_contrast {
            return None;
        }
        let level = threshold::otsu_level(&hist);
        let binary = threshold::binarize_fixed(&sample.pixels, level);

        let arena = Bump::new();
        let labeled = segmentation::label_components(&arena, &binary, sample.width, sample.height);

        let expected_diameter = sample.radius * 2.0;
        let mut best: Option<f64> = None;
        for s in &labeled.component_stats {
            let w = f64::from(s.bbox_width());
            let h = f64::from(s.bbox_height());
            let aspect = w.max(h) / w.min(h).max(1.0);
            if aspect > 1.5 {
                continue;
            }
            // A filled disc covers ~pi/4 of its bounding box
            let fill = f64::from(s.bbox_fill());
            if !(0.6..=0.95).contains(&fill) {
                continue;
            }
            let diameter = w.max(h);
            let deviation = (diameter - expected_diameter).abs() / expected_diameter;
            if deviation > config.shape_diameter_tolerance {
                continue;
            }
            let closeness = 1.0 - deviation / config.shape_diameter_tolerance;
            if best.is_none_or(|b| closeness > b) {
                best = Some(closeness);
            }
        }

        match best {
            Some(closeness) => Some(BubbleReading {
                filled: true,
                confidence: 0.3 + 0.5 * closeness,
                fill_ratio: 1.0,
            }),
            // No circle found: weak evidence for blank
            None => Some(BubbleReading {
                filled: false,
                confidence: 0.25,
                fill_ratio: 0.0,
            }),
        }
    }
}

fn intensity_range(hist: &[u32; 256]) -> (u8, u8) {
    let lo = hist.iter().position(|&c| c > 0).unwrap_or(0) as u8;
    let hi = hist.iter().rposition(|&c| c > 0).unwrap_or(0) as u8;
    (lo, hi)
}

fn reading_from_ratio(ratio: f64, config: &ScanConfig) -> BubbleReading {
    let distance = (ratio - config.fill_threshold).abs();
    BubbleReading {
        filled: ratio >= config.fill_threshold,
        confidence: (distance / config.fill_confidence_scale).clamp(0.0, 1.0),
        fill_ratio: ratio,
    }
}

/// Dark-pixel ratio inside the inscribed circle of the expected mark area.
/// The slight shrink discounts residue of the printed outline that erosion
/// did not remove.
fn interior_dark_ratio(binary: &[u8], sample: &RegionSample) -> f64 {
    let cx = sample.width as f64 / 2.0;
    let cy = sample.height as f64 / 2.0;
    let r = sample.radius * 0.85;
    let r2 = r * r;

    let mut dark = 0u32;
    let mut total = 0u32;
    for y in 0..sample.height {
        for x in 0..sample.width {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy <= r2 {
                total += 1;
                if binary[y * sample.width + x] == 0 {
                    dark += 1;
                }
            }
        }
    }
    if total == 0 {
        0.0
    } else {
        f64::from(dark) / f64::from(total)
    }
}

/// Classify one bubble through the strategy chain: the fill-ratio reading is
/// kept when confident; otherwise the shape fallback runs and the higher
/// confidence reading wins.
#[must_use]
pub fn classify_bubble(sample: &RegionSample, config: &ScanConfig) -> BubbleReading {
    let primary = FillRatioStrategy
        .classify(sample, config)
        .unwrap_or(BubbleReading {
            filled: false,
            confidence: 0.0,
            fill_ratio: 0.0,
        });
    if primary.confidence >= config.fallback_trigger_confidence {
        return primary;
    }
    match ShapeStrategy.classify(sample, config) {
        Some(fallback) if fallback.confidence > primary.confidence => fallback,
        _ => primary,
    }
}

/// Outcome of resolving one question's option readings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Selection {
    /// Exactly one option was filled.
    Single(usize),
    /// No option was filled.
    NoMark,
    /// More than one option was filled; never collapsed into a guess.
    Multiple,
}

/// Detection result for one question.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionDetection {
    /// Question number.
    pub number: u32,
    /// Resolved selection.
    pub selection: Selection,
    /// Confidence in [0, 1]; the minimum of the constituent option
    /// confidences, so the weakest option dominates.
    pub confidence: f64,
    /// Per-option readings, option order preserved.
    pub options: Vec<BubbleReading>,
}

/// Resolve per-option readings into a question-level detection.
///
/// Exactly one filled option is that answer; zero is [`Selection::NoMark`]
/// with confidence reflecting how close the nearest option came to the fill
/// threshold; two or more are [`Selection::Multiple`], flagged for review
/// downstream regardless of confidence.
#[must_use]
pub fn resolve_question(number: u32, readings: Vec<BubbleReading>) -> QuestionDetection {
    let filled: Vec<usize> = readings
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.filled.then_some(i))
        .collect();

    let min_all = readings
        .iter()
        .map(|r| r.confidence)
        .fold(1.0f64, f64::min);

    let (selection, confidence) = match filled.as_slice() {
        [single] => (Selection::Single(*single), min_all),
        [] => (Selection::NoMark, min_all),
        many => {
            let min_filled = many
                .iter()
                .map(|&i| readings[i].confidence)
                .fold(1.0f64, f64::min);
            (Selection::Multiple, min_filled)
        }
    };

    QuestionDetection {
        number,
        selection,
        confidence,
        options: readings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::RegionId;
    use proptest::prelude::*;

    fn reading(filled: bool, confidence: f64) -> BubbleReading {
        BubbleReading {
            filled,
            confidence,
            fill_ratio: if filled { 0.8 } else { 0.05 },
        }
    }

    /// Render a synthetic bubble sample with a given interior fill fraction.
    fn synthetic_sample(fill_fraction: f64) -> RegionSample {
        let radius = 10.0f64;
        let side = 32usize;
        let mut pixels = vec![230u8; side * side];
        let c = side as f64 / 2.0;
        // Printed outline
        for y in 0..side {
            for x in 0..side {
                let dx = x as f64 + 0.5 - c;
                let dy = y as f64 + 0.5 - c;
                let d = (dx * dx + dy * dy).sqrt();
                if (d - radius).abs() < 1.0 {
                    pixels[y * side + x] = 40;
                }
            }
        }
        // Fill from the center outward to the requested area fraction
        let fill_radius = radius * fill_fraction.sqrt();
        for y in 0..side {
            for x in 0..side {
                let dx = x as f64 + 0.5 - c;
                let dy = y as f64 + 0.5 - c;
                if (dx * dx + dy * dy).sqrt() <= fill_radius {
                    pixels[y * side + x] = 30;
                }
            }
        }
        RegionSample {
            id: RegionId::Bubble { question: 1, option: 0 },
            pixels,
            width: side,
            height: side,
            radius,
        }
    }

    #[test]
    fn test_filled_bubble_detected() {
        let sample = synthetic_sample(0.95);
        let r = classify_bubble(&sample, &ScanConfig::default());
        assert!(r.filled);
        assert!(r.confidence > 0.5, "confidence {} too low", r.confidence);
    }

    #[test]
    fn test_blank_bubble_detected() {
        let sample = synthetic_sample(0.0);
        let r = classify_bubble(&sample, &ScanConfig::default());
        assert!(!r.filled);
        assert!(r.confidence > 0.5, "confidence {} too low", r.confidence);
    }

    #[test]
    fn test_fill_ratio_confidence_monotonic() {
        let config = ScanConfig::default();
        let fractions = [0.0, 0.1, 0.2, 0.5, 0.7, 0.9];
        let readings: Vec<BubbleReading> = fractions
            .iter()
            .map(|&f| {
                FillRatioStrategy
                    .classify(&synthetic_sample(f), &config)
                    .unwrap()
            })
            .collect();
        // Confidence must not decrease as the measured ratio moves away
        // from the threshold
        let mut pairs: Vec<(f64, f64)> = readings
            .iter()
            .map(|r| ((r.fill_ratio - config.fill_threshold).abs(), r.confidence))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for w in pairs.windows(2) {
            assert!(
                w[1].1 >= w[0].1 - 1e-9,
                "confidence decreased: {pairs:?}"
            );
        }
    }

    #[test]
    fn test_resolve_single() {
        let det = resolve_question(
            7,
            vec![reading(false, 0.9), reading(true, 0.8), reading(false, 0.95)],
        );
        assert_eq!(det.selection, Selection::Single(1));
        assert!((det.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_none_uses_nearest_option() {
        let det = resolve_question(
            1,
            vec![reading(false, 0.9), reading(false, 0.1), reading(false, 0.7)],
        );
        assert_eq!(det.selection, Selection::NoMark);
        assert!((det.confidence - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_multiple_never_guesses() {
        let det = resolve_question(
            2,
            vec![reading(true, 0.99), reading(true, 0.98), reading(false, 0.9)],
        );
        assert_eq!(det.selection, Selection::Multiple);
    }

    proptest! {
        #[test]
        fn prop_resolution_matches_filled_count(
            flags in proptest::collection::vec(any::<bool>(), 2..6),
            confs in proptest::collection::vec(0.0f64..1.0, 2..6)
        ) {
            let n = flags.len().min(confs.len());
            let readings: Vec<BubbleReading> = (0..n)
                .map(|i| reading(flags[i], confs[i]))
                .collect();
            let filled_count = readings.iter().filter(|r| r.filled).count();
            let det = resolve_question(0, readings);
            match det.selection {
                Selection::Single(i) => {
                    prop_assert_eq!(filled_count, 1);
                    prop_assert!(det.options[i].filled);
                }
                Selection::NoMark => prop_assert_eq!(filled_count, 0),
                Selection::Multiple => prop_assert!(filled_count >= 2),
            }
            prop_assert!((0.0..=1.0).contains(&det.confidence));
        }
    }
}
