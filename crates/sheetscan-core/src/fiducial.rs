//! Nested-square fiducial marker detection and order-independent corner
//! classification.
//!
//! A marker prints as a dark outer square ring enclosing a smaller dark
//! square. After connected components labeling, a marker appears as an outer
//! hollow component whose bounding box strictly contains a smaller solid
//! component with a nearby centroid. Candidates are filtered by area,
//! aspect ratio, bounding-box fill, and inner/outer area ratio to reject
//! bubbles, digit strokes, and noise.

use tracing::debug;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::segmentation::LabelResult;

/// A detected marker candidate in image pixel coordinates.
#[derive(Clone, Copy, Debug)]
pub struct MarkerCandidate {
    /// Center of the marker (outer component centroid).
    pub center: [f64; 2],
    /// Outer bounding-box size (max of width and height) in pixels.
    pub size: f64,
}

/// Scan labeled components for the nested-square signature.
#[must_use]
pub fn detect_markers(label_result: &LabelResult, config: &ScanConfig) -> Vec<MarkerCandidate> {
    let stats = &label_result.component_stats;

    // Outer candidates: large enough, square-ish, hollow (ring-like fill)
    let mut outers: Vec<usize> = Vec::new();
    for (i, s) in stats.iter().enumerate() {
        if s.pixel_count < config.marker_min_area {
            continue;
        }
        let w = s.bbox_width() as f32;
        let h = s.bbox_height() as f32;
        let aspect = w.max(h) / w.min(h).max(1.0);
        if aspect > config.marker_max_aspect {
            continue;
        }
        let fill = s.bbox_fill();
        if fill < config.marker_fill_min || fill > config.marker_fill_max {
            continue;
        }
        outers.push(i);
    }

    let mut markers = Vec::new();
    for &oi in &outers {
        let outer = &stats[oi];
        let outer_size = f64::from(outer.bbox_width().max(outer.bbox_height()));
        let outer_center = outer.centroid();

        let mut found_inner = false;
        for (ii, inner) in stats.iter().enumerate() {
            if ii == oi || !outer.contains_bbox(inner) {
                continue;
            }
            let ratio = f64::from(inner.pixel_count) / f64::from(outer.pixel_count);
            if ratio < config.marker_inner_ratio_min || ratio > config.marker_inner_ratio_max {
                continue;
            }
            let inner_center = inner.centroid();
            let dx = inner_center[0] - outer_center[0];
            let dy = inner_center[1] - outer_center[1];
            if (dx * dx + dy * dy).sqrt() > config.marker_center_tolerance * outer_size {
                continue;
            }
            found_inner = true;
            break;
        }

        if found_inner {
            debug!(
                cx = outer_center[0],
                cy = outer_center[1],
                size = outer_size,
                "fiducial candidate"
            );
            markers.push(MarkerCandidate {
                center: outer_center,
                size: outer_size,
            });
        }
    }
    markers
}

/// The four corner markers ordered top-left, top-right, bottom-right,
/// bottom-left.
#[derive(Clone, Copy, Debug)]
pub struct CornerSet {
    /// Corner centers in TL, TR, BR, BL order.
    pub corners: [[f64; 2]; 4],
    /// Indices into the candidate list that were used as corners.
    pub used: [usize; 4],
}

/// Classify marker centers into logical corners by their position relative
/// to the set centroid, never by scan or detection order. Within each
/// quadrant the point farthest from the centroid wins, so auxiliary markers
/// closer to the page interior do not displace the true corners.
pub fn classify_corners(centers: &[[f64; 2]]) -> Result<CornerSet, ScanError> {
    if centers.len() < 4 {
        return Err(ScanError::InsufficientMarkers {
            found: centers.len(),
            required: 4,
        });
    }

    let n = centers.len() as f64;
    let cx = centers.iter().map(|c| c[0]).sum::<f64>() / n;
    let cy = centers.iter().map(|c| c[1]).sum::<f64>() / n;

    // Quadrants: 0 = TL, 1 = TR, 2 = BR, 3 = BL
    let mut best: [Option<(usize, f64)>; 4] = [None; 4];
    for (i, c) in centers.iter().enumerate() {
        let quadrant = match (c[0] < cx, c[1] < cy) {
            (true, true) => 0,
            (false, true) => 1,
            (false, false) => 2,
            (true, false) => 3,
        };
        let d2 = (c[0] - cx).powi(2) + (c[1] - cy).powi(2);
        if best[quadrant].is_none_or(|(_, bd)| d2 > bd) {
            best[quadrant] = Some((i, d2));
        }
    }

    let mut corners = [[0.0; 2]; 4];
    let mut used = [0usize; 4];
    for (q, slot) in best.iter().enumerate() {
        let Some((i, _)) = slot else {
            // A whole quadrant is empty: a corner marker is missing even
            // though four or more candidates exist.
            return Err(ScanError::InsufficientMarkers {
                found: centers.len(),
                required: 4,
            });
        };
        corners[q] = centers[*i];
        used[q] = *i;
    }
    Ok(CornerSet { corners, used })
}

/// Check the corner quad for near-collinearity: the sine of every interior
/// angle must exceed `min_sin`.
#[must_use]
pub fn corners_well_conditioned(corners: &[[f64; 2]; 4], min_sin: f64) -> bool {
    for i in 0..4 {
        let p = corners[i];
        let prev = corners[(i + 3) % 4];
        let next = corners[(i + 1) % 4];
        let a = [prev[0] - p[0], prev[1] - p[1]];
        let b = [next[0] - p[0], next[1] - p[1]];
        let la = (a[0] * a[0] + a[1] * a[1]).sqrt();
        let lb = (b[0] * b[0] + b[1] * b[1]).sqrt();
        if la < 1.0 || lb < 1.0 {
            return false;
        }
        let cross = (a[0] * b[1] - a[1] * b[0]).abs();
        if cross / (la * lb) < min_sin {
            return false;
        }
    }
    true
}
