//! Essential-matrix estimation and decomposition.
//!
//! `E` relates normalized coordinates by `x2^T E x1 = 0` with `x2 = R x1 + t`,
//! i.e. `E = [t]x R`.

use nalgebra as na;

use super::ransac::Estimator;
use crate::types::Intrinsics;

/// A correspondence in pixels together with its normalized coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Correspondence {
    pub pixel1: na::Point2<f64>,
    pub pixel2: na::Point2<f64>,
    pub norm1: na::Point2<f64>,
    pub norm2: na::Point2<f64>,
}

impl Correspondence {
    pub fn new(intrinsics: &Intrinsics, pixel1: na::Point2<f64>, pixel2: na::Point2<f64>) -> Self {
        Self {
            pixel1,
            pixel2,
            norm1: intrinsics.normalize(&pixel1),
            norm2: intrinsics.normalize(&pixel2),
        }
    }
}

/// SVD with singular values in descending order.
pub(crate) fn sorted_svd3(
    m: &na::Matrix3<f64>,
) -> Option<(na::Matrix3<f64>, na::Vector3<f64>, na::Matrix3<f64>)> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let s = svd.singular_values;
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| s[b].total_cmp(&s[a]));

    let mut u_sorted = na::Matrix3::zeros();
    let mut v_t_sorted = na::Matrix3::zeros();
    let mut s_sorted = na::Vector3::zeros();
    for (dst, &src) in order.iter().enumerate() {
        u_sorted.set_column(dst, &u.column(src));
        v_t_sorted.set_row(dst, &v_t.row(src));
        s_sorted[dst] = s[src];
    }
    Some((u_sorted, s_sorted, v_t_sorted))
}

/// Translates the centroid to the origin and scales the mean distance to sqrt(2).
fn hartley_normalize(pts: &[na::Point2<f64>]) -> Option<(Vec<na::Point2<f64>>, na::Matrix3<f64>)> {
    let n = pts.len() as f64;
    let centroid = pts.iter().fold(na::Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let mean_dist = pts.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / n;
    if mean_dist < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = na::Matrix3::new(
        s, 0.0, -s * centroid.x, //
        0.0, s, -s * centroid.y, //
        0.0, 0.0, 1.0,
    );
    let normalized = pts
        .iter()
        .map(|p| na::Point2::from((p.coords - centroid) * s))
        .collect();
    Some((normalized, t))
}

/// Projects onto the essential manifold: singular values (1, 1, 0).
pub fn enforce_essential_constraints(e: &na::Matrix3<f64>) -> Option<na::Matrix3<f64>> {
    let (u, _, v_t) = sorted_svd3(e)?;
    Some(u * na::Matrix3::from_diagonal(&na::Vector3::new(1.0, 1.0, 0.0)) * v_t)
}

/// Normalized 8-point algorithm on calibrated coordinates (at least 8 pairs).
pub fn essential_8point(pts1: &[na::Point2<f64>], pts2: &[na::Point2<f64>]) -> Option<na::Matrix3<f64>> {
    if pts1.len() != pts2.len() || pts1.len() < 8 {
        return None;
    }
    let (n1, t1) = hartley_normalize(pts1)?;
    let (n2, t2) = hartley_normalize(pts2)?;

    let rows = pts1.len().max(9);
    let mut a = na::DMatrix::<f64>::zeros(rows, 9);
    for (i, (p1, p2)) in n1.iter().zip(&n2).enumerate() {
        let (x, y) = (p1.x, p1.y);
        let (xp, yp) = (p2.x, p2.y);
        a.row_mut(i)
            .copy_from_slice(&[xp * x, xp * y, xp, yp * x, yp * y, yp, x, y, 1.0]);
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let null = v_t.row(svd.singular_values.imin());
    let e_n = na::Matrix3::new(
        null[0], null[1], null[2], //
        null[3], null[4], null[5], //
        null[6], null[7], null[8],
    );
    let e = t2.transpose() * e_n * t1;
    let e = enforce_essential_constraints(&e)?;
    let norm = e.norm();
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    Some(e / norm)
}

/// The four `(R, t)` candidates of an essential matrix. `t` is unit length.
pub fn decompose_essential(
    e: &na::Matrix3<f64>,
) -> Option<[(na::Rotation3<f64>, na::Vector3<f64>); 4]> {
    let (mut u, _, mut v_t) = sorted_svd3(&enforce_essential_constraints(e)?)?;
    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }
    let w = na::Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = na::Rotation3::from_matrix_unchecked(u * w * v_t);
    let r2 = na::Rotation3::from_matrix_unchecked(u * w.transpose() * v_t);
    let t: na::Vector3<f64> = u.column(2).normalize();
    Some([(r1, t), (r1, -t), (r2, t), (r2, -t)])
}

/// Fundamental matrix in pixel space: `K^-T E K^-1`.
pub fn essential_to_fundamental(e: &na::Matrix3<f64>, intrinsics: &Intrinsics) -> na::Matrix3<f64> {
    let k_inv = intrinsics.inverse_matrix();
    k_inv.transpose() * e * k_inv
}

/// First-order geometric distance of a correspondence to the epipolar geometry.
pub fn sampson_distance(f: &na::Matrix3<f64>, x1: &na::Point2<f64>, x2: &na::Point2<f64>) -> f64 {
    let x1 = x1.to_homogeneous();
    let x2 = x2.to_homogeneous();
    let fx1 = f * x1;
    let ftx2 = f.transpose() * x2;
    let num = x2.dot(&fx1);
    let den = fx1.x * fx1.x + fx1.y * fx1.y + ftx2.x * ftx2.x + ftx2.y * ftx2.y;
    if den <= f64::EPSILON {
        return f64::INFINITY;
    }
    (num * num / den).sqrt()
}

#[derive(Debug, Clone)]
pub struct EssentialModel {
    pub essential: na::Matrix3<f64>,
    pub fundamental: na::Matrix3<f64>,
}

/// RANSAC adaptor: fits `E` on normalized points, scores in pixels.
pub struct EssentialEstimator {
    pub intrinsics: Intrinsics,
}

impl EssentialEstimator {
    fn model(&self, e: na::Matrix3<f64>) -> EssentialModel {
        EssentialModel {
            fundamental: essential_to_fundamental(&e, &self.intrinsics),
            essential: e,
        }
    }
}

impl Estimator for EssentialEstimator {
    type Datum = Correspondence;
    type Model = EssentialModel;

    const MIN_SAMPLES: usize = 8;

    fn fit(&self, data: &[Correspondence], sample: &[usize]) -> Option<EssentialModel> {
        let (p1, p2): (Vec<_>, Vec<_>) = sample.iter().map(|&i| (data[i].norm1, data[i].norm2)).unzip();
        essential_8point(&p1, &p2).map(|e| self.model(e))
    }

    fn residual(&self, model: &EssentialModel, datum: &Correspondence) -> f64 {
        sampson_distance(&model.fundamental, &datum.pixel1, &datum.pixel2)
    }

    fn refit(&self, data: &[Correspondence], inliers: &[usize]) -> Option<EssentialModel> {
        self.fit(data, inliers)
    }
}
