use std::collections::BTreeMap;

use log::{debug, warn};
use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{ReconstructionError, Result};
use crate::types::{PairId, Pose};

/// A triangulated point and the pair it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub position: na::Point3<f64>,
    pub pair: PairId,
}

impl Point3D {
    pub fn new(position: na::Point3<f64>, pair: PairId) -> Point3D {
        Point3D { position, pair }
    }
}

/// Flat, unordered point set. Points from different pairs are never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<Point3D>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point3D> {
        self.points.iter()
    }

    /// N x 3 coordinates.
    pub fn to_xyz(&self) -> Vec<[f64; 3]> {
        self.points
            .iter()
            .map(|p| [p.position.x, p.position.y, p.position.z])
            .collect()
    }
}

/// Coordinate frame the accumulated points are expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// Each pair keeps its own frame, first camera at the origin.
    #[default]
    Local,
    /// Pair poses are composed so points share the frame of the first image.
    /// Every pair still carries its own arbitrary scale.
    Chained,
}

pub struct PointCloudAccumulator {
    frame_mode: FrameMode,
    points: Vec<Point3D>,
    /// Camera-to-world pose per image index, only filled in chained mode.
    camera_poses: BTreeMap<usize, na::Isometry3<f64>>,
}

impl PointCloudAccumulator {
    pub fn new(frame_mode: FrameMode) -> PointCloudAccumulator {
        PointCloudAccumulator {
            frame_mode,
            points: Vec::new(),
            camera_poses: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn camera_poses(&self) -> &BTreeMap<usize, na::Isometry3<f64>> {
        &self.camera_poses
    }

    /// Appends one pair's points, mapping them to the chained frame if enabled.
    pub fn add_pair(&mut self, pose: &Pose, points: Vec<Point3D>) {
        match self.frame_mode {
            FrameMode::Local => self.points.extend(points),
            FrameMode::Chained => {
                let world_from_first = self.anchor(pose.pair);
                self.points.extend(points.into_iter().map(|p| Point3D {
                    position: world_from_first * p.position,
                    pair: p.pair,
                }));
                let world_from_second = world_from_first * pose.to_isometry().inverse();
                self.camera_poses
                    .entry(pose.pair.second)
                    .or_insert(world_from_second);
            }
        }
    }

    fn anchor(&mut self, pair: PairId) -> na::Isometry3<f64> {
        if let Some(pose) = self.camera_poses.get(&pair.first) {
            return *pose;
        }
        if self.camera_poses.is_empty() {
            debug!("anchoring image {} at the origin", pair.first);
        } else {
            warn!(
                "image {} has no chained pose, pair {} starts a new frame",
                pair.first, pair
            );
        }
        let identity = na::Isometry3::identity();
        self.camera_poses.insert(pair.first, identity);
        identity
    }

    /// Hands the cloud off. An empty cloud is a reconstruction failure.
    pub fn finish(self) -> Result<PointCloud> {
        if self.points.is_empty() {
            return Err(ReconstructionError::EmptyReconstruction);
        }
        Ok(PointCloud {
            points: self.points,
        })
    }
}
