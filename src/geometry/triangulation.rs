//! Linear (DLT) two-view triangulation with per-point validation.

use log::trace;
use nalgebra as na;

use crate::cloud::Point3D;
use crate::error::{ReconstructionError, Result};
use crate::types::{PairId, ProjectionMatrix};

/// Relative size of the third singular value below which the DLT system is
/// treated as rank deficient (parallel rays, coincident centres).
const RANK_TOLERANCE: f64 = 1e-9;

/// Homogeneous solution of the 4x4 DLT system built from both projections.
///
/// `None` when the system does not pin down a single point.
pub fn triangulate_dlt(
    p1: &ProjectionMatrix,
    p2: &ProjectionMatrix,
    x1: &na::Point2<f64>,
    x2: &na::Point2<f64>,
) -> Option<na::Vector4<f64>> {
    let mut a = na::Matrix4::zeros();
    let rows = [
        p1.row(2) * x1.x - p1.row(0),
        p1.row(2) * x1.y - p1.row(1),
        p2.row(2) * x2.x - p2.row(0),
        p2.row(2) * x2.y - p2.row(1),
    ];
    for (i, row) in rows.iter().enumerate() {
        let norm = row.norm();
        if norm < f64::EPSILON {
            return None;
        }
        a.set_row(i, &(row / norm));
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let mut s: Vec<f64> = svd.singular_values.iter().copied().collect();
    s.sort_by(|a, b| b.total_cmp(a));
    if s[0] <= 0.0 || s[2] <= RANK_TOLERANCE * s[0] {
        return None;
    }
    Some(v_t.row(svd.singular_values.imin()).transpose())
}

/// Signed depth of `x` in front of the camera `p`.
pub fn depth(p: &ProjectionMatrix, x: &na::Point3<f64>) -> f64 {
    let m = p.fixed_view::<3, 3>(0, 0);
    let w = (p * x.to_homogeneous())[2];
    let m3 = m.row(2).norm();
    m.determinant().signum() * w / m3
}

pub struct Triangulator {
    p1: ProjectionMatrix,
    p2: ProjectionMatrix,
}

impl Triangulator {
    pub fn new(p1: ProjectionMatrix, p2: ProjectionMatrix) -> Triangulator {
        Triangulator { p1, p2 }
    }

    /// One validated point, or `TriangulationInvalid` with the reason.
    pub fn triangulate_one(
        &self,
        x1: &na::Point2<f64>,
        x2: &na::Point2<f64>,
    ) -> Result<na::Point3<f64>> {
        let h = triangulate_dlt(&self.p1, &self.p2, x1, x2)
            .ok_or(ReconstructionError::TriangulationInvalid("degenerate ray geometry"))?;
        if h[3].abs() <= f64::EPSILON * h.norm() {
            return Err(ReconstructionError::TriangulationInvalid("point at infinity"));
        }
        let x = na::Point3::from(h.xyz() / h[3]);
        if !(x.x.is_finite() && x.y.is_finite() && x.z.is_finite()) {
            return Err(ReconstructionError::TriangulationInvalid("non-finite coordinates"));
        }
        let d1 = depth(&self.p1, &x);
        let d2 = depth(&self.p2, &x);
        if !(d1.is_finite() && d2.is_finite()) || d1 <= 0.0 || d2 <= 0.0 {
            return Err(ReconstructionError::TriangulationInvalid("behind camera"));
        }
        Ok(x)
    }

    /// Triangulates aligned pixel pairs, silently dropping invalid points.
    pub fn triangulate(
        &self,
        pair: PairId,
        pts1: &[na::Point2<f64>],
        pts2: &[na::Point2<f64>],
    ) -> Vec<Point3D> {
        pts1.iter()
            .zip(pts2)
            .enumerate()
            .filter_map(|(i, (x1, x2))| match self.triangulate_one(x1, x2) {
                Ok(p) => Some(Point3D::new(p, pair)),
                Err(e) => {
                    trace!("pair {} correspondence {}: {}", pair, i, e);
                    None
                }
            })
            .collect()
    }
}
