//! Geometric normalization: fiducial location, corner classification,
//! consistency checks, and perspective resampling into the canonical frame.
//!
//! No downstream stage runs on an unverified geometry: every failure here is
//! fatal to the scan and reported, never silently defaulted.

use bumpalo::Bump;
use tracing::{debug, info_span};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::fiducial::{self, MarkerCandidate};
use crate::homography::{self, Homography};
use crate::image::{GrayBuffer, ImageView};
use crate::segmentation;
use crate::template::Template;
use crate::threshold;

/// Counters from a normalization pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct NormalizeStats {
    /// Marker candidates that passed the signature filters.
    pub num_candidates: usize,
    /// Correspondences used for the final transform (4 for the exact fit).
    pub num_correspondences: usize,
    /// Whether the least-squares refit rejected one outlier correspondence.
    pub rejected_outlier: bool,
}

/// Detect fiducials in the raw grayscale image and resample it into the
/// template's canonical frame.
pub fn normalize(
    img: &ImageView,
    template: &Template,
    config: &ScanConfig,
    arena: &Bump,
) -> Result<(GrayBuffer, NormalizeStats), ScanError> {
    let mut stats = NormalizeStats::default();

    let candidates = {
        let _span = info_span!("fiducial_detection").entered();
        let binary = threshold::binarize_adaptive(img, config.adaptive_radius, config.adaptive_constant);
        let labeled = segmentation::label_components(arena, &binary, img.width, img.height);
        fiducial::detect_markers(&labeled, config)
    };
    stats.num_candidates = candidates.len();
    debug!(candidates = candidates.len(), "fiducial candidates");

    let centers: Vec<[f64; 2]> = candidates.iter().map(|m| m.center).collect();
    let detected = fiducial::classify_corners(&centers)?;

    if !fiducial::corners_well_conditioned(&detected.corners, config.min_corner_angle_sin) {
        return Err(ScanError::GeometryDegenerate {
            reason: "corner markers are near-collinear".into(),
        });
    }

    // Canonical corners, classified by the same relative-position rule so
    // detected and canonical orderings agree.
    let canonical_centers: Vec<[f64; 2]> = template.fiducials.iter().map(|f| f.center).collect();
    let canonical = fiducial::classify_corners(&canonical_centers).map_err(|_| {
        ScanError::InvalidTemplate("template fiducials do not span all four corners".into())
    })?;

    // Consistency check before the homography: a 4-point DLT fits exactly by
    // construction, so a shifted marker is only visible as residual against
    // the stiffer affine model.
    let corner_pairs: Vec<([f64; 2], [f64; 2])> = (0..4)
        .map(|i| (canonical.corners[i], detected.corners[i]))
        .collect();
    let quad_diag = diagonal(&detected.corners);
    let residual =
        homography::affine_max_residual(&corner_pairs).ok_or(ScanError::GeometryDegenerate {
            reason: "affine consistency fit failed".into(),
        })?;
    if residual > config.fiducial_residual_tolerance * quad_diag {
        return Err(ScanError::GeometryDegenerate {
            reason: format!(
                "corner marker inconsistent with page geometry (residual {:.1}px over {:.1}px diagonal)",
                residual, quad_diag
            ),
        });
    }

    let initial = Homography::from_pairs(&canonical.corners, &detected.corners).ok_or(
        ScanError::GeometryDegenerate {
            reason: "homography estimation failed".into(),
        },
    )?;

    // Robust refinement: when the template declares auxiliary fiducials and
    // they are found, re-estimate over all correspondences and drop at most
    // one outlier.
    let mut pairs = corner_pairs;
    collect_auxiliary_pairs(
        template,
        &canonical,
        &candidates,
        &detected.used,
        &initial,
        config,
        &mut pairs,
    );

    let transform = if pairs.len() > 4 {
        let (h, rejected) = refit_with_outlier_rejection(&mut pairs, quad_diag, config)?;
        stats.rejected_outlier = rejected;
        h
    } else {
        initial
    };
    stats.num_correspondences = pairs.len();

    let (out_w, out_h) = template.canonical_dims();
    let normalized = {
        let _span = info_span!("warp").entered();
        homography::warp_to_canonical(img, &transform, out_w, out_h)
    };
    Ok((normalized, stats))
}

fn diagonal(corners: &[[f64; 2]; 4]) -> f64 {
    let d1 = ((corners[0][0] - corners[2][0]).powi(2) + (corners[0][1] - corners[2][1]).powi(2))
        .sqrt();
    let d2 = ((corners[1][0] - corners[3][0]).powi(2) + (corners[1][1] - corners[3][1]).powi(2))
        .sqrt();
    d1.max(d2)
}

/// Match non-corner template fiducials to unclaimed candidates near their
/// projected positions under the initial transform.
fn collect_auxiliary_pairs(
    template: &Template,
    canonical: &fiducial::CornerSet,
    candidates: &[MarkerCandidate],
    used_candidates: &[usize; 4],
    initial: &Homography,
    config: &ScanConfig,
    pairs: &mut Vec<([f64; 2], [f64; 2])>,
) {
    for (fi, f) in template.fiducials.iter().enumerate() {
        if canonical.used.contains(&fi) {
            continue;
        }
        let expected = initial.project(f.center);
        let mut best: Option<(usize, f64)> = None;
        for (ci, cand) in candidates.iter().enumerate() {
            if used_candidates.contains(&ci) {
                continue;
            }
            let d = ((cand.center[0] - expected[0]).powi(2)
                + (cand.center[1] - expected[1]).powi(2))
            .sqrt();
            if d <= config.fiducial_match_radius * cand.size
                && best.is_none_or(|(_, bd)| d < bd)
            {
                best = Some((ci, d));
            }
        }
        if let Some((ci, d)) = best {
            debug!(fiducial = fi, distance = d, "matched auxiliary fiducial");
            pairs.push((f.center, candidates[ci].center));
        }
    }
}

/// Least-squares fit over all correspondences; if the worst residual exceeds
/// tolerance and at least five correspondences remain after dropping it, the
/// fit is repeated once without it. A second failure is degenerate geometry.
fn refit_with_outlier_rejection(
    pairs: &mut Vec<([f64; 2], [f64; 2])>,
    quad_diag: f64,
    config: &ScanConfig,
) -> Result<(Homography, bool), ScanError> {
    let tolerance = config.fiducial_residual_tolerance * quad_diag;
    let mut rejected = false;
    for attempt in 0..2 {
        let h = Homography::from_correspondences(pairs).ok_or(ScanError::GeometryDegenerate {
            reason: "least-squares homography estimation failed".into(),
        })?;
        let (worst_idx, worst_res) = pairs
            .iter()
            .enumerate()
            .map(|(i, &(src, dst))| (i, h.residual(src, dst)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));
        if worst_res <= tolerance {
            return Ok((h, rejected));
        }
        if attempt == 0 && pairs.len() > 5 {
            debug!(residual = worst_res, "rejecting outlier correspondence");
            pairs.swap_remove(worst_idx);
            rejected = true;
        } else {
            return Err(ScanError::GeometryDegenerate {
                reason: format!(
                    "fiducial correspondences remain inconsistent (residual {worst_res:.1}px)"
                ),
            });
        }
    }
    unreachable!("refit loop returns on every path")
}
