//! Identifier (student ID) recognition: each digit box is binarized, the
//! stroke is isolated and normalized onto a fixed glyph grid, and the grid
//! is matched against a 0-9 stroke codebook by Hamming distance. Confidence
//! combines the fit of the best match with its margin over the runner-up.
//!
//! Field-level confidence is the minimum of the digit confidences: a single
//! unreadable digit surfaces the whole ID for review instead of being
//! silently guessed.

use std::sync::LazyLock;

use bumpalo::Bump;
use serde::Serialize;

use crate::config::ScanConfig;
use crate::sample::{FieldSamples, RegionSample};
use crate::segmentation;
use crate::threshold;

/// Glyph grid dimensions: 5 columns by 7 rows.
pub const GLYPH_COLS: usize = 5;
/// Glyph grid row count.
pub const GLYPH_ROWS: usize = 7;
const GLYPH_BITS: u32 = (GLYPH_COLS * GLYPH_ROWS) as u32;

// Classic 5x7 matrix-display digit strokes. Minimum pairwise Hamming
// distance over the set is 6 (closest pairs: 0/8, 8/9, 6/8).
const GLYPH_PATTERNS: [[&str; GLYPH_ROWS]; 10] = [
    [".###.", "#...#", "#..##", "#.#.#", "##..#", "#...#", ".###."],
    ["..#..", ".##..", "..#..", "..#..", "..#..", "..#..", ".###."],
    [".###.", "#...#", "....#", "...#.", "..#..", ".#...", "#####"],
    ["#####", "...#.", "..#..", "...#.", "....#", "#...#", ".###."],
    ["...#.", "..##.", ".#.#.", "#..#.", "#####", "...#.", "...#."],
    ["#####", "#....", "####.", "....#", "....#", "#...#", ".###."],
    ["..##.", ".#...", "#....", "####.", "#...#", "#...#", ".###."],
    ["#####", "....#", "...#.", "..#..", ".#...", ".#...", ".#..."],
    [".###.", "#...#", "#...#", ".###.", "#...#", "#...#", ".###."],
    [".###.", "#...#", "#...#", ".####", "....#", "...#.", ".##.."],
];

/// The digit stroke codebook: one bit pattern per digit, row-major with bit
/// index `row * GLYPH_COLS + col`.
pub struct DigitCodebook {
    codes: [u64; 10],
}

impl DigitCodebook {
    fn build() -> Self {
        let mut codes = [0u64; 10];
        for (digit, rows) in GLYPH_PATTERNS.iter().enumerate() {
            let mut bits = 0u64;
            for (r, row) in rows.iter().enumerate() {
                for (c, ch) in row.chars().enumerate() {
                    if ch == '#' {
                        bits |= 1 << (r * GLYPH_COLS + c);
                    }
                }
            }
            codes[digit] = bits;
        }
        Self { codes }
    }

    /// Bit pattern for one digit.
    #[must_use]
    pub fn code(&self, digit: u8) -> u64 {
        self.codes[digit as usize]
    }

    /// Match a glyph grid against the codebook. Returns the best digit, its
    /// Hamming distance, and the runner-up distance.
    #[must_use]
    pub fn classify(&self, bits: u64) -> (u8, u32, u32) {
        let mut best_digit = 0u8;
        let mut best = u32::MAX;
        let mut second = u32::MAX;
        for (digit, &code) in self.codes.iter().enumerate() {
            let d = (bits ^ code).count_ones();
            if d < best {
                second = best;
                best = d;
                best_digit = digit as u8;
            } else if d < second {
                second = d;
            }
        }
        (best_digit, best, second)
    }
}

/// Shared codebook instance.
pub static CODEBOOK: LazyLock<DigitCodebook> = LazyLock::new(DigitCodebook::build);

/// Detection result for one digit box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DigitDetection {
    /// Recognized digit, or `None` when the box is empty or the stroke could
    /// not be isolated.
    pub digit: Option<u8>,
    /// Confidence in [0, 1]. Always produced.
    pub confidence: f64,
}

/// Detection result for one identifier field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldDetection {
    /// Field index in the template.
    pub field: usize,
    /// Per-digit detections, most significant first.
    pub digits: Vec<DigitDetection>,
    /// Recognized digit string; unreadable positions render as `?`.
    pub text: String,
    /// Minimum of the constituent digit confidences.
    pub confidence: f64,
}

/// Recognize one digit box.
#[must_use]
pub fn recognize_digit(sample: &RegionSample, config: &ScanConfig) -> DigitDetection {
    let hist = threshold::histogram(&sample.pixels);
    let lo = hist.iter().position(|&c| c > 0).unwrap_or(0) as u8;
    let hi = hist.iter().rposition(|&c| c > 0).unwrap_or(0) as u8;
    if hi.saturating_sub(lo) < config.min_sample_contrast {
        return DigitDetection {
            digit: None,
            confidence: 0.0,
        };
    }

    let level = threshold::otsu_level(&hist);
    let binary = threshold::binarize_fixed(&sample.pixels, level);

    let arena = Bump::new();
    let labeled = segmentation::label_components(&arena, &binary, sample.width, sample.height);

    // Union bounding box of all stroke components; handwritten digits often
    // fragment into several.
    let mut min_x = usize::MAX;
    let mut max_x = 0usize;
    let mut min_y = usize::MAX;
    let mut max_y = 0usize;
    let mut found = false;
    for s in &labeled.component_stats {
        if s.pixel_count < config.digit_min_pixels {
            continue;
        }
        found = true;
        min_x = min_x.min(s.min_x as usize);
        max_x = max_x.max(s.max_x as usize);
        min_y = min_y.min(s.min_y as usize);
        max_y = max_y.max(s.max_y as usize);
    }
    if !found {
        return DigitDetection {
            digit: None,
            confidence: 0.0,
        };
    }

    let bits = rasterize_glyph(
        &binary,
        sample.width,
        sample.height,
        (min_x, min_y, max_x, max_y),
        config.digit_cell_fill,
    );
    let (digit, best, second) = CODEBOOK.classify(bits);

    let fit = 1.0 - f64::from(best) / f64::from(GLYPH_BITS);
    let margin = (f64::from(second - best) / 4.0).min(1.0);
    DigitDetection {
        digit: Some(digit),
        confidence: (fit * margin).clamp(0.0, 1.0),
    }
}

/// Normalize the stroke bounding box onto the glyph grid: each cell is set
/// when its dark fraction reaches `cell_fill`.
///
/// The bounding box is first padded, centered, to the grid's 5:7 aspect
/// ratio. Stretching a narrow stroke (a written "1" covers only the middle
/// grid columns) across the full grid would destroy its column alignment
/// and with it the codebook match.
fn rasterize_glyph(
    binary: &[u8],
    width: usize,
    height: usize,
    bbox: (usize, usize, usize, usize),
    cell_fill: f64,
) -> u64 {
    let (min_x, min_y, max_x, max_y) = bbox;
    let mut x0 = min_x as f64;
    let mut y0 = min_y as f64;
    let mut glyph_w = (max_x - min_x + 1) as f64;
    let mut glyph_h = (max_y - min_y + 1) as f64;

    let target_aspect = GLYPH_COLS as f64 / GLYPH_ROWS as f64;
    if glyph_w / glyph_h < target_aspect {
        let padded = glyph_h * target_aspect;
        x0 -= (padded - glyph_w) / 2.0;
        glyph_w = padded;
    } else {
        let padded = glyph_w / target_aspect;
        y0 -= (padded - glyph_h) / 2.0;
        glyph_h = padded;
    }

    let mut bits = 0u64;
    for gr in 0..GLYPH_ROWS {
        for gc in 0..GLYPH_COLS {
            let cx0 = x0 + glyph_w * gc as f64 / GLYPH_COLS as f64;
            let cx1 = x0 + glyph_w * (gc + 1) as f64 / GLYPH_COLS as f64;
            let cy0 = y0 + glyph_h * gr as f64 / GLYPH_ROWS as f64;
            let cy1 = y0 + glyph_h * (gr + 1) as f64 / GLYPH_ROWS as f64;

            let mut dark = 0u32;
            let mut total = 0u32;
            // Padded cells can reach outside the sample; those pixels read
            // as background.
            for y in (cy0.floor() as i64)..(cy1.ceil() as i64) {
                for x in (cx0.floor() as i64)..(cx1.ceil() as i64) {
                    total += 1;
                    if x >= 0
                        && y >= 0
                        && (x as usize) < width
                        && (y as usize) < height
                        && binary[y as usize * width + x as usize] == 0
                    {
                        dark += 1;
                    }
                }
            }
            if total > 0 && f64::from(dark) / f64::from(total) >= cell_fill {
                bits |= 1 << (gr * GLYPH_COLS + gc);
            }
        }
    }
    bits
}

/// Recognize one identifier field from its digit box samples. Field
/// confidence is the minimum digit confidence.
#[must_use]
pub fn recognize_field(samples: &FieldSamples, config: &ScanConfig) -> FieldDetection {
    let digits: Vec<DigitDetection> = samples
        .samples
        .iter()
        .map(|s| recognize_digit(s, config))
        .collect();

    let text: String = digits
        .iter()
        .map(|d| match d.digit {
            Some(v) => char::from(b'0' + v),
            None => '?',
        })
        .collect();
    let confidence = digits
        .iter()
        .map(|d| d.confidence)
        .fold(1.0f64, f64::min);

    FieldDetection {
        field: samples.field,
        digits,
        text,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::RegionId;

    /// Render a glyph pattern into a sample, scaled up with margins.
    fn glyph_sample(digit: u8, cell: usize, degrade_rows: &[usize]) -> RegionSample {
        let margin = 4;
        let width = GLYPH_COLS * cell + margin * 2;
        let height = GLYPH_ROWS * cell + margin * 2;
        let mut pixels = vec![240u8; width * height];
        for (r, row) in GLYPH_PATTERNS[digit as usize].iter().enumerate() {
            if degrade_rows.contains(&r) {
                continue;
            }
            for (c, ch) in row.chars().enumerate() {
                if ch != '#' {
                    continue;
                }
                for dy in 0..cell {
                    for dx in 0..cell {
                        let x = margin + c * cell + dx;
                        let y = margin + r * cell + dy;
                        pixels[y * width + x] = 25;
                    }
                }
            }
        }
        RegionSample {
            id: RegionId::Digit { field: 0, position: 0 },
            pixels,
            width,
            height,
            radius: (width.min(height) / 2) as f64,
        }
    }

    #[test]
    fn test_codebook_self_distance() {
        for digit in 0..10u8 {
            let (d, best, second) = CODEBOOK.classify(CODEBOOK.code(digit));
            assert_eq!(d, digit);
            assert_eq!(best, 0);
            assert!(second >= 4, "digit {digit} too close to runner-up ({second})");
        }
    }

    #[test]
    fn test_codebook_pairwise_separation() {
        for a in 0..10u8 {
            for b in (a + 1)..10 {
                let d = (CODEBOOK.code(a) ^ CODEBOOK.code(b)).count_ones();
                assert!(d >= 4, "digits {a} and {b} only {d} bits apart");
            }
        }
    }

    #[test]
    fn test_clean_digits_recognized() {
        let config = ScanConfig::default();
        for digit in 0..10u8 {
            let sample = glyph_sample(digit, 6, &[]);
            let det = recognize_digit(&sample, &config);
            assert_eq!(det.digit, Some(digit), "digit {digit} misread");
            // A cleanly written digit must never trip the review flag
            assert!(
                det.confidence > config.identifier_flag_confidence,
                "digit {digit} confidence {} too low",
                det.confidence
            );
        }
    }

    #[test]
    fn test_narrow_digit_keeps_column_alignment() {
        // A written "1" covers only the middle glyph columns; its stroke
        // bounding box must not be stretched across the full grid.
        let config = ScanConfig::default();
        let det = recognize_digit(&glyph_sample(1, 6, &[]), &config);
        assert_eq!(det.digit, Some(1));
        assert!(det.confidence > 0.9, "confidence {}", det.confidence);
    }

    #[test]
    fn test_empty_box_unreadable() {
        let config = ScanConfig::default();
        let sample = RegionSample {
            id: RegionId::Digit { field: 0, position: 0 },
            pixels: vec![240u8; 30 * 40],
            width: 30,
            height: 40,
            radius: 15.0,
        };
        let det = recognize_digit(&sample, &config);
        assert_eq!(det.digit, None);
        assert!(det.confidence < f64::EPSILON);
    }

    #[test]
    fn test_degraded_digit_low_confidence() {
        let config = ScanConfig::default();
        let clean = recognize_digit(&glyph_sample(3, 6, &[]), &config);
        let degraded = recognize_digit(&glyph_sample(3, 6, &[1, 3, 5]), &config);
        assert!(
            degraded.confidence < clean.confidence,
            "degraded {} vs clean {}",
            degraded.confidence,
            clean.confidence
        );
    }

    #[test]
    fn test_field_confidence_is_minimum() {
        let config = ScanConfig::default();
        let samples = FieldSamples {
            field: 0,
            samples: vec![
                glyph_sample(1, 6, &[]),
                glyph_sample(2, 6, &[0, 2, 4, 6]),
                glyph_sample(3, 6, &[]),
            ],
        };
        let field = recognize_field(&samples, &config);
        let min = field
            .digits
            .iter()
            .map(|d| d.confidence)
            .fold(1.0f64, f64::min);
        assert!((field.confidence - min).abs() < 1e-12);
        assert_eq!(field.digits.len(), 3);
    }
}
