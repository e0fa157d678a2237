use log::{info, warn};
use nalgebra as na;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cloud::{Point3D, PointCloud, PointCloudAccumulator};
use crate::config::ReconstructionConfig;
use crate::data_loader::load_frame_features;
use crate::detected_points::{FrameFeature, Image};
use crate::error::{ReconstructionError, Result};
use crate::extractor::FeatureExtractor;
use crate::geometry::{PoseEstimator, Triangulator};
use crate::matcher::{FeatureMatcher, Match};
use crate::types::{Intrinsics, PairId, Pose, canonical_projection, projection_matrix};

/// Which image pairs of the ordered sequence get reconstructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PairSelection {
    /// `(i, i + 1)` only.
    #[default]
    Adjacent,
    /// Every `(i, j)` with `i < j`.
    All,
    /// `(i, j)` with `0 < j - i <= size`.
    Window { size: usize },
}

impl PairSelection {
    /// Position pairs over a sequence of `n` frames, sorted by first then second.
    pub fn pairs(&self, n: usize) -> Vec<(usize, usize)> {
        let max_gap = match *self {
            PairSelection::Adjacent => 1,
            PairSelection::All => n,
            PairSelection::Window { size } => size,
        }
        .min(n);
        (0..n)
            .flat_map(|i| ((i + 1)..n.min(i + max_gap + 1)).map(move |j| (i, j)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Reconstructed,
    InsufficientCorrespondence,
    DegenerateGeometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    pub pair: PairId,
    pub keypoints: (usize, usize),
    pub matches: usize,
    pub inliers: usize,
    pub points: usize,
    pub status: PairStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of one successfully reconstructed pair.
#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub pose: Pose,
    pub matches: usize,
    pub inliers: usize,
    pub points: Vec<Point3D>,
}

#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub cloud: PointCloud,
    pub pairs: Vec<PairReport>,
    pub image_count: usize,
}

/// Runs extraction, matching, pose estimation and triangulation pair by pair.
///
/// Pairs are processed strictly in order and never share state. A pair that
/// fails is logged and skipped; only an empty final cloud fails the run.
pub struct Reconstructor {
    config: ReconstructionConfig,
    intrinsics: Intrinsics,
    extractor: FeatureExtractor,
    matcher: FeatureMatcher,
    pose_estimator: PoseEstimator,
}

impl Reconstructor {
    pub fn new(intrinsics: Intrinsics, config: ReconstructionConfig) -> Reconstructor {
        Reconstructor {
            extractor: FeatureExtractor::new(config.extractor.clone()),
            matcher: FeatureMatcher::new(config.matcher.clone()),
            pose_estimator: PoseEstimator::new(
                intrinsics,
                config.ransac.clone(),
                config.min_correspondences,
                config.cheirality_samples,
            ),
            intrinsics,
            config,
        }
    }

    /// Loads every image under `folder`, skipping the ones that fail to decode.
    pub fn reconstruct_folder(&self, folder: &str) -> Result<Reconstruction> {
        let frames: Vec<FrameFeature> = load_frame_features(folder, &self.extractor)?
            .into_iter()
            .flatten()
            .collect();
        self.reconstruct_features(&frames)
    }

    pub fn reconstruct_images(&self, images: &[Image]) -> Result<Reconstruction> {
        let frames: Vec<FrameFeature> = images
            .par_iter()
            .map(|img| self.extractor.extract(img))
            .collect();
        self.reconstruct_features(&frames)
    }

    /// `frames` must be in sequence order.
    pub fn reconstruct_features(&self, frames: &[FrameFeature]) -> Result<Reconstruction> {
        let mut accumulator = PointCloudAccumulator::new(self.config.frame_mode);
        let mut reports = Vec::new();

        for (i, j) in self.config.pair_selection.pairs(frames.len()) {
            let (a, b) = (&frames[i], &frames[j]);
            let pair = PairId::new(a.index, b.index);
            let matches = self.matcher.match_descriptors(&a.descriptors(), &b.descriptors());
            let mut report = PairReport {
                pair,
                keypoints: (a.len(), b.len()),
                matches: matches.len(),
                inliers: 0,
                points: 0,
                status: PairStatus::Reconstructed,
                message: None,
            };
            match self.reconstruct_pair(pair, a, b, &matches) {
                Ok(outcome) => {
                    info!(
                        "pair {}: {} matches, {} inliers, {} points",
                        pair,
                        outcome.matches,
                        outcome.inliers,
                        outcome.points.len()
                    );
                    report.inliers = outcome.inliers;
                    report.points = outcome.points.len();
                    accumulator.add_pair(&outcome.pose, outcome.points);
                }
                Err(e) => {
                    report.status = match e {
                        ReconstructionError::InsufficientCorrespondence { .. } => {
                            PairStatus::InsufficientCorrespondence
                        }
                        ReconstructionError::DegenerateGeometry(_) => PairStatus::DegenerateGeometry,
                        other => return Err(other),
                    };
                    warn!("skipping pair {}: {}", pair, e);
                    report.message = Some(e.to_string());
                }
            }
            reports.push(report);
        }

        let cloud = accumulator.finish()?;
        info!(
            "reconstructed {} points from {} of {} pairs",
            cloud.len(),
            reports
                .iter()
                .filter(|r| r.status == PairStatus::Reconstructed)
                .count(),
            reports.len()
        );
        Ok(Reconstruction {
            cloud,
            pairs: reports,
            image_count: frames.len(),
        })
    }

    /// Matches and reconstructs a single pair.
    pub fn process_pair(&self, a: &FrameFeature, b: &FrameFeature) -> Result<PairOutcome> {
        let matches = self.matcher.match_descriptors(&a.descriptors(), &b.descriptors());
        self.reconstruct_pair(PairId::new(a.index, b.index), a, b, &matches)
    }

    fn reconstruct_pair(
        &self,
        pair: PairId,
        a: &FrameFeature,
        b: &FrameFeature,
        matches: &[Match],
    ) -> Result<PairOutcome> {
        let (pts1, pts2): (Vec<_>, Vec<_>) = matches
            .iter()
            .map(|m| {
                let p1 = a.keypoints[m.query_idx].p2d;
                let p2 = b.keypoints[m.train_idx].p2d;
                (
                    na::Point2::new(p1.x as f64, p1.y as f64),
                    na::Point2::new(p2.x as f64, p2.y as f64),
                )
            })
            .unzip();

        let estimate = self.pose_estimator.estimate(&pts1, &pts2)?;
        let pose = Pose::new(pair, estimate.rotation, estimate.translation);

        let (in1, in2): (Vec<_>, Vec<_>) = pts1
            .into_iter()
            .zip(pts2)
            .zip(&estimate.inlier_mask)
            .filter_map(|(pp, &keep)| keep.then_some(pp))
            .unzip();
        let triangulator = Triangulator::new(
            canonical_projection(&self.intrinsics),
            projection_matrix(&self.intrinsics, pose.rotation.matrix(), &pose.translation),
        );
        let points = triangulator.triangulate(pair, &in1, &in2);

        Ok(PairOutcome {
            pose,
            matches: matches.len(),
            inliers: estimate.num_inliers,
            points,
        })
    }
}
