//! Perspective transforms between the canonical template frame and image
//! pixels: exact 4-point DLT, overdetermined least-squares estimation, and
//! the inverse-mapped bilinear warp that produces the normalized image.

use nalgebra::{DMatrix, DVector, SMatrix, SVector};
use rayon::prelude::*;

use crate::image::{GrayBuffer, ImageView};

/// A 3x3 homography matrix mapping canonical coordinates to image pixels.
pub struct Homography {
    /// The 3x3 matrix, normalized so `h[(2, 2)] == 1`.
    pub h: SMatrix<f64, 3, 3>,
}

impl Homography {
    /// Compute a homography from exactly 4 source points to 4 destination
    /// points using DLT with `h[(2, 2)]` fixed to 1.
    #[must_use]
    pub fn from_pairs(src: &[[f64; 2]; 4], dst: &[[f64; 2]; 4]) -> Option<Self> {
        let mut m = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for i in 0..4 {
            let sx = src[i][0];
            let sy = src[i][1];
            let dx = dst[i][0];
            let dy = dst[i][1];

            m[(i * 2, 0)] = sx;
            m[(i * 2, 1)] = sy;
            m[(i * 2, 2)] = 1.0;
            m[(i * 2, 6)] = -sx * dx;
            m[(i * 2, 7)] = -sy * dx;
            b[i * 2] = dx;

            m[(i * 2 + 1, 3)] = sx;
            m[(i * 2 + 1, 4)] = sy;
            m[(i * 2 + 1, 5)] = 1.0;
            m[(i * 2 + 1, 6)] = -sx * dy;
            m[(i * 2 + 1, 7)] = -sy * dy;
            b[i * 2 + 1] = dy;
        }

        let h_vec = m.lu().solve(&b)?;
        Some(Self::from_params(&h_vec.as_slice().try_into().ok()?))
    }

    /// Least-squares homography from 5 or more correspondences
    /// `(src, dst)`, solving the normal equations with `h[(2, 2)]` fixed.
    /// Returns `None` for degenerate configurations.
    #[must_use]
    pub fn from_correspondences(pairs: &[([f64; 2], [f64; 2])]) -> Option<Self> {
        let n = pairs.len();
        if n < 4 {
            return None;
        }
        let mut m = DMatrix::<f64>::zeros(2 * n, 8);
        let mut b = DVector::<f64>::zeros(2 * n);
        for (i, &(src, dst)) in pairs.iter().enumerate() {
            let [sx, sy] = src;
            let [dx, dy] = dst;
            m[(i * 2, 0)] = sx;
            m[(i * 2, 1)] = sy;
            m[(i * 2, 2)] = 1.0;
            m[(i * 2, 6)] = -sx * dx;
            m[(i * 2, 7)] = -sy * dx;
            b[i * 2] = dx;
            m[(i * 2 + 1, 3)] = sx;
            m[(i * 2 + 1, 4)] = sy;
            m[(i * 2 + 1, 5)] = 1.0;
            m[(i * 2 + 1, 6)] = -sx * dy;
            m[(i * 2 + 1, 7)] = -sy * dy;
            b[i * 2 + 1] = dy;
        }
        let mtm = m.transpose() * &m;
        let mtb = m.transpose() * &b;
        let h_vec = mtm.lu().solve(&mtb)?;
        let params: [f64; 8] = h_vec.as_slice().try_into().ok()?;
        Some(Self::from_params(&params))
    }

    fn from_params(p: &[f64; 8]) -> Self {
        let mut h = SMatrix::<f64, 3, 3>::identity();
        h[(0, 0)] = p[0];
        h[(0, 1)] = p[1];
        h[(0, 2)] = p[2];
        h[(1, 0)] = p[3];
        h[(1, 1)] = p[4];
        h[(1, 2)] = p[5];
        h[(2, 0)] = p[6];
        h[(2, 1)] = p[7];
        h[(2, 2)] = 1.0;
        Self { h }
    }

    /// Project a point through the homography.
    #[must_use]
    pub fn project(&self, p: [f64; 2]) -> [f64; 2] {
        let res = self.h * SVector::<f64, 3>::new(p[0], p[1], 1.0);
        let w = res[2];
        [res[0] / w, res[1] / w]
    }

    /// Reprojection residual of one correspondence, in destination units.
    #[must_use]
    pub fn residual(&self, src: [f64; 2], dst: [f64; 2]) -> f64 {
        let p = self.project(src);
        ((p[0] - dst[0]).powi(2) + (p[1] - dst[1]).powi(2)).sqrt()
    }
}

/// Least-squares affine fit (6 dof) from 4 or more correspondences, returning
/// the maximum residual in destination units. With four corner markers this
/// is overdetermined by two constraints, so a single mis-detected marker
/// surfaces as a large residual even though the 4-point homography itself
/// would fit exactly.
#[must_use]
pub fn affine_max_residual(pairs: &[([f64; 2], [f64; 2])]) -> Option<f64> {
    let n = pairs.len();
    if n < 3 {
        return None;
    }
    let mut m = DMatrix::<f64>::zeros(2 * n, 6);
    let mut b = DVector::<f64>::zeros(2 * n);
    for (i, &(src, dst)) in pairs.iter().enumerate() {
        let [sx, sy] = src;
        m[(i * 2, 0)] = sx;
        m[(i * 2, 1)] = sy;
        m[(i * 2, 2)] = 1.0;
        b[i * 2] = dst[0];
        m[(i * 2 + 1, 3)] = sx;
        m[(i * 2 + 1, 4)] = sy;
        m[(i * 2 + 1, 5)] = 1.0;
        b[i * 2 + 1] = dst[1];
    }
    let mtm = m.transpose() * &m;
    let mtb = m.transpose() * &b;
    let a = mtm.lu().solve(&mtb)?;

    let mut max_res = 0.0f64;
    for &(src, dst) in pairs {
        let px = a[0] * src[0] + a[1] * src[1] + a[2];
        let py = a[3] * src[0] + a[4] * src[1] + a[5];
        let res = ((px - dst[0]).powi(2) + (py - dst[1]).powi(2)).sqrt();
        max_res = max_res.max(res);
    }
    Some(max_res)
}

/// Resample the source image into canonical pixel space by inverse mapping:
/// every output pixel center is projected through `canonical_to_image` and
/// bilinearly sampled. Pixels mapping outside the source read as white.
#[must_use]
pub fn warp_to_canonical(
    src: &ImageView,
    canonical_to_image: &Homography,
    out_width: usize,
    out_height: usize,
) -> GrayBuffer {
    let mut out = GrayBuffer::filled(out_width, out_height, 255);
    let w = src.width as f64;
    let h = src.height as f64;

    out.data
        .par_chunks_mut(out_width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.iter_mut().enumerate() {
                let p = canonical_to_image.project([x as f64 + 0.5, y as f64 + 0.5]);
                let sx = p[0] - 0.5;
                let sy = p[1] - 0.5;
                if sx < -1.0 || sy < -1.0 || sx > w || sy > h {
                    *px = 255;
                } else {
                    *px = src.sample_bilinear(sx, sy).round().clamp(0.0, 255.0) as u8;
                }
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_pairs() {
        let pts = [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]];
        let h = Homography::from_pairs(&pts, &pts).unwrap();
        let p = h.project([37.0, 59.0]);
        assert!((p[0] - 37.0).abs() < 1e-9);
        assert!((p[1] - 59.0).abs() < 1e-9);
    }

    #[test]
    fn test_translation() {
        let src = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let dst = [[5.0, 7.0], [15.0, 7.0], [15.0, 17.0], [5.0, 17.0]];
        let h = Homography::from_pairs(&src, &dst).unwrap();
        let p = h.project([3.0, 4.0]);
        assert!((p[0] - 8.0).abs() < 1e-9);
        assert!((p[1] - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_least_squares_matches_exact_on_consistent_points() {
        let src = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let dst = [[2.0, 1.0], [22.0, 3.0], [24.0, 25.0], [1.0, 21.0]];
        let exact = Homography::from_pairs(&src, &dst).unwrap();
        let pairs: Vec<_> = src.iter().copied().zip(dst.iter().copied()).collect();
        let ls = Homography::from_correspondences(&pairs).unwrap();
        for p in [[5.0, 5.0], [1.0, 9.0], [8.0, 2.0]] {
            let a = exact.project(p);
            let b = ls.project(p);
            assert!((a[0] - b[0]).abs() < 1e-6);
            assert!((a[1] - b[1]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_affine_residual_flags_shifted_corner() {
        let src = [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]];
        let mut dst = src;
        dst[2] = [130.0, 135.0]; // one corner pushed well away
        let pairs: Vec<_> = src.iter().copied().zip(dst.iter().copied()).collect();
        let res = affine_max_residual(&pairs).unwrap();
        assert!(res > 10.0, "residual {res} too small for a shifted corner");

        let clean: Vec<_> = src.iter().copied().zip(src.iter().copied()).collect();
        let res_clean = affine_max_residual(&clean).unwrap();
        assert!(res_clean < 1e-6);
    }

    #[test]
    fn test_warp_identity_copies_image() {
        let mut data = vec![255u8; 64 * 64];
        for y in 20..40 {
            for x in 20..40 {
                data[y * 64 + x] = 0;
            }
        }
        let img = ImageView::new(&data, 64, 64, 64).unwrap();
        let corners = [[0.0, 0.0], [64.0, 0.0], [64.0, 64.0], [0.0, 64.0]];
        let h = Homography::from_pairs(&corners, &corners).unwrap();
        let out = warp_to_canonical(&img, &h, 64, 64);
        let diff: u64 = out
            .data
            .iter()
            .zip(data.iter())
            .map(|(&a, &b)| u64::from(a.abs_diff(b)))
            .sum();
        let mean_diff = diff as f64 / data.len() as f64;
        assert!(mean_diff < 1.0, "mean diff {mean_diff} too high");
    }
}
