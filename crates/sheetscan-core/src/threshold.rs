//! Binarization primitives: integral image, local-mean adaptive threshold,
//! Otsu global threshold, and erosion.
//!
//! Convention throughout the crate: in a binarized buffer, `0` is ink (dark)
//! and `255` is background, matching the grayscale sense of the source.

use crate::image::ImageView;

/// Compute a summed-area table with one extra row and column of zeros.
/// `integral` must hold `(width + 1) * (height + 1)` entries.
pub fn compute_integral_image(img: &ImageView, integral: &mut [u64]) {
    let stride = img.width + 1;
    debug_assert_eq!(integral.len(), stride * (img.height + 1));
    for v in integral[..stride].iter_mut() {
        *v = 0;
    }
    for y in 0..img.height {
        let row = img.get_row(y);
        let mut row_sum = 0u64;
        integral[(y + 1) * stride] = 0;
        for x in 0..img.width {
            row_sum += u64::from(row[x]);
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }
}

#[inline]
fn window_mean(integral: &[u64], stride: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
    // Half-open window [x0, x1) x [y0, y1) in image coordinates.
    let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
        - integral[y0 * stride + x1]
        - integral[y1 * stride + x0];
    let count = ((x1 - x0) * (y1 - y0)) as u64;
    sum / count
}

/// Locally-adaptive threshold using an integral image for constant-time
/// window means. A pixel is ink when it falls below its local window mean
/// minus `constant`. Robust to uneven lighting across the sheet.
pub fn adaptive_threshold(
    img: &ImageView,
    integral: &[u64],
    output: &mut [u8],
    radius: usize,
    constant: i16,
) {
    let stride = img.width + 1;
    for y in 0..img.height {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(img.height);
        let row = img.get_row(y);
        let out_row = &mut output[y * img.width..(y + 1) * img.width];
        for x in 0..img.width {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(img.width);
            let mean = window_mean(integral, stride, x0, y0, x1, y1) as i32;
            let level = mean - i32::from(constant);
            out_row[x] = if i32::from(row[x]) < level { 0 } else { 255 };
        }
    }
}

/// Convenience wrapper: allocate the integral image and binarize in one step.
#[must_use]
pub fn binarize_adaptive(img: &ImageView, radius: usize, constant: i16) -> Vec<u8> {
    let mut integral = vec![0u64; (img.width + 1) * (img.height + 1)];
    compute_integral_image(img, &mut integral);
    let mut out = vec![0u8; img.width * img.height];
    adaptive_threshold(img, &integral, &mut out, radius, constant);
    out
}

/// 256-bin histogram of a pixel slice.
#[must_use]
pub fn histogram(pixels: &[u8]) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for &p in pixels {
        hist[p as usize] += 1;
    }
    hist
}

/// Otsu's automatic global threshold: the level maximizing between-class
/// variance. Returns the level such that pixels `< level` are ink.
#[must_use]
pub fn otsu_level(hist: &[u32; 256]) -> u8 {
    let total: u64 = hist.iter().map(|&c| u64::from(c)).sum();
    if total == 0 {
        return 128;
    }
    let weighted_total: u64 = hist
        .iter()
        .enumerate()
        .map(|(v, &c)| v as u64 * u64::from(c))
        .sum();

    let mut best_level = 128u8;
    let mut best_variance = -1.0f64;
    let mut count_below = 0u64;
    let mut sum_below = 0u64;

    for level in 0..256usize {
        count_below += u64::from(hist[level]);
        if count_below == 0 {
            continue;
        }
        let count_above = total - count_below;
        if count_above == 0 {
            break;
        }
        sum_below += level as u64 * u64::from(hist[level]);

        let mean_below = sum_below as f64 / count_below as f64;
        let mean_above = (weighted_total - sum_below) as f64 / count_above as f64;
        let w0 = count_below as f64 / total as f64;
        let w1 = count_above as f64 / total as f64;
        let variance = w0 * w1 * (mean_below - mean_above) * (mean_below - mean_above);
        if variance > best_variance {
            best_variance = variance;
            // Ink is strictly below the separating level
            best_level = (level + 1).min(255) as u8;
        }
    }
    best_level
}

/// Binarize a pixel slice against a fixed level: `0` for ink, `255` otherwise.
#[must_use]
pub fn binarize_fixed(pixels: &[u8], level: u8) -> Vec<u8> {
    pixels
        .iter()
        .map(|&p| if p < level { 0 } else { 255 })
        .collect()
}

/// One pass of 4-neighbor erosion on ink pixels: an ink pixel survives only
/// if all four neighbors are ink. Shrinks thin structures such as a bubble's
/// printed outline while leaving solid fills mostly intact.
#[must_use]
pub fn erode_ink(binary: &[u8], width: usize, height: usize, iterations: usize) -> Vec<u8> {
    let mut current = binary.to_vec();
    let mut next = vec![255u8; binary.len()];
    for _ in 0..iterations {
        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                let mut keep = current[idx] == 0;
                if keep {
                    keep = x > 0
                        && x + 1 < width
                        && y > 0
                        && y + 1 < height
                        && current[idx - 1] == 0
                        && current[idx + 1] == 0
                        && current[idx - width] == 0
                        && current[idx + width] == 0;
                }
                next[idx] = if keep { 0 } else { 255 };
            }
        }
        std::mem::swap(&mut current, &mut next);
    }
    current
}
