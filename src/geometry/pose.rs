use log::debug;
use nalgebra as na;

use super::essential::{Correspondence, EssentialEstimator, decompose_essential};
use super::ransac::{Estimator, RansacConfig, ransac};
use super::triangulation::{depth, triangulate_dlt};
use crate::error::{ReconstructionError, Result};
use crate::types::{Intrinsics, ProjectionMatrix};

/// Fewest correspondences the estimator will work with.
pub const MIN_CORRESPONDENCES: usize = EssentialEstimator::MIN_SAMPLES;

/// Relative pose of the second view with respect to the first.
#[derive(Debug, Clone)]
pub struct PoseEstimate {
    pub rotation: na::Rotation3<f64>,
    /// Unit direction.
    pub translation: na::Vector3<f64>,
    pub essential: na::Matrix3<f64>,
    pub inlier_mask: Vec<bool>,
    pub num_inliers: usize,
}

#[derive(Debug, Clone)]
pub struct PoseEstimator {
    intrinsics: Intrinsics,
    ransac: RansacConfig,
    min_correspondences: usize,
    cheirality_samples: usize,
}

impl PoseEstimator {
    pub fn new(
        intrinsics: Intrinsics,
        ransac: RansacConfig,
        min_correspondences: usize,
        cheirality_samples: usize,
    ) -> PoseEstimator {
        PoseEstimator {
            intrinsics,
            ransac,
            min_correspondences: min_correspondences.max(MIN_CORRESPONDENCES),
            cheirality_samples: cheirality_samples.max(1),
        }
    }

    pub fn min_correspondences(&self) -> usize {
        self.min_correspondences
    }

    /// Robust essential matrix, decomposition and cheirality disambiguation.
    ///
    /// `pts1[i]` and `pts2[i]` are pixel coordinates of the same feature.
    pub fn estimate(
        &self,
        pts1: &[na::Point2<f64>],
        pts2: &[na::Point2<f64>],
    ) -> Result<PoseEstimate> {
        if pts1.len() != pts2.len() {
            return Err(ReconstructionError::DegenerateGeometry(format!(
                "point count mismatch: {} vs {}",
                pts1.len(),
                pts2.len()
            )));
        }
        if pts1.len() < self.min_correspondences {
            return Err(ReconstructionError::InsufficientCorrespondence {
                found: pts1.len(),
                required: self.min_correspondences,
            });
        }

        let data: Vec<Correspondence> = pts1
            .iter()
            .zip(pts2)
            .map(|(a, b)| Correspondence::new(&self.intrinsics, *a, *b))
            .collect();
        let estimator = EssentialEstimator {
            intrinsics: self.intrinsics,
        };
        let result = ransac(&estimator, &data, &self.ransac, self.min_correspondences);
        let Some(model) = result.model else {
            return Err(ReconstructionError::DegenerateGeometry(format!(
                "no essential matrix with at least {} inliers among {} correspondences",
                self.min_correspondences,
                data.len()
            )));
        };
        debug!(
            "essential matrix: {}/{} inliers after {} iterations, rms {:.4} px",
            result.num_inliers,
            data.len(),
            result.iters,
            result.inlier_rms
        );

        let inliers: Vec<&Correspondence> = data
            .iter()
            .zip(&result.inlier_mask)
            .filter_map(|(c, &keep)| keep.then_some(c))
            .collect();
        let (rotation, translation) = self.select_by_cheirality(&model.essential, &inliers)?;

        Ok(PoseEstimate {
            rotation,
            translation,
            essential: model.essential,
            inlier_mask: result.inlier_mask,
            num_inliers: result.num_inliers,
        })
    }

    /// Picks the candidate that puts the most sampled inliers in front of
    /// both cameras. Ties and all-zero counts are degenerate.
    fn select_by_cheirality(
        &self,
        essential: &na::Matrix3<f64>,
        inliers: &[&Correspondence],
    ) -> Result<(na::Rotation3<f64>, na::Vector3<f64>)> {
        let candidates = decompose_essential(essential).ok_or_else(|| {
            ReconstructionError::DegenerateGeometry("essential matrix decomposition failed".into())
        })?;
        let stride = inliers.len().div_ceil(self.cheirality_samples).max(1);
        let sample: Vec<&Correspondence> = inliers.iter().step_by(stride).copied().collect();

        let p1 = ProjectionMatrix::identity();
        let counts: Vec<usize> = candidates
            .iter()
            .map(|(r, t)| {
                let mut p2 = ProjectionMatrix::zeros();
                p2.fixed_view_mut::<3, 3>(0, 0).copy_from(r.matrix());
                p2.fixed_view_mut::<3, 1>(0, 3).copy_from(t);
                sample
                    .iter()
                    .filter(|c| in_front_of_both(&p1, &p2, c))
                    .count()
            })
            .collect();
        debug!("cheirality counts {:?} over {} samples", counts, sample.len());

        let best = counts.iter().copied().max().unwrap_or(0);
        if best == 0 {
            return Err(ReconstructionError::DegenerateGeometry(
                "no pose candidate places points in front of both cameras".into(),
            ));
        }
        if counts.iter().filter(|&&c| c == best).count() > 1 {
            return Err(ReconstructionError::DegenerateGeometry(format!(
                "ambiguous cheirality {:?}",
                counts
            )));
        }
        let idx = counts.iter().position(|&c| c == best).unwrap_or(0);
        Ok(candidates[idx])
    }
}

fn in_front_of_both(p1: &ProjectionMatrix, p2: &ProjectionMatrix, c: &Correspondence) -> bool {
    let Some(h) = triangulate_dlt(p1, p2, &c.norm1, &c.norm2) else {
        return false;
    };
    if h[3].abs() <= f64::EPSILON * h.norm() {
        return false;
    }
    let x = na::Point3::from(h.xyz() / h[3]);
    depth(p1, &x) > 0.0 && depth(p2, &x) > 0.0
}
