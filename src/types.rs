use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics. No distortion model is applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Default for Intrinsics {
    fn default() -> Self {
        Self {
            fx: 495.21153939,
            fy: 504.81851369,
            cx: 335.75450282,
            cy: 179.00894773,
        }
    }
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Intrinsics {
        Intrinsics { fx, fy, cx, cy }
    }

    /// Reads fx, fy, cx, cy out of a 3x3 camera matrix. Skew is ignored.
    pub fn from_matrix(k: &na::Matrix3<f64>) -> Intrinsics {
        Intrinsics {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    pub fn matrix(&self) -> na::Matrix3<f64> {
        na::Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn inverse_matrix(&self) -> na::Matrix3<f64> {
        na::Matrix3::new(
            1.0 / self.fx,
            0.0,
            -self.cx / self.fx,
            0.0,
            1.0 / self.fy,
            -self.cy / self.fy,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Pixel to normalized image plane.
    pub fn normalize(&self, p: &na::Point2<f64>) -> na::Point2<f64> {
        na::Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    /// Camera frame to pixel.
    pub fn project(&self, p: &na::Point3<f64>) -> na::Point2<f64> {
        na::Point2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        )
    }
}

/// Indices of the two images of a pair, in sequence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairId {
    pub first: usize,
    pub second: usize,
}

impl PairId {
    pub fn new(first: usize, second: usize) -> PairId {
        PairId { first, second }
    }
}

impl std::fmt::Display for PairId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

/// Relative motion of the second camera of a pair: `x2 = R * x1 + t`.
///
/// The translation is a unit direction; its magnitude cannot be recovered
/// from two monocular views.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub pair: PairId,
    pub rotation: na::Rotation3<f64>,
    pub translation: na::Vector3<f64>,
}

impl Pose {
    pub fn new(pair: PairId, rotation: na::Rotation3<f64>, translation: na::Vector3<f64>) -> Pose {
        Pose {
            pair,
            rotation,
            translation,
        }
    }

    /// First-to-second camera transform.
    pub fn to_isometry(&self) -> na::Isometry3<f64> {
        na::Isometry3::from_parts(
            na::Translation3::from(self.translation),
            na::UnitQuaternion::from_rotation_matrix(&self.rotation),
        )
    }
}

pub type ProjectionMatrix = na::Matrix3x4<f64>;

/// `K * [R | t]`.
pub fn projection_matrix(
    intrinsics: &Intrinsics,
    rotation: &na::Matrix3<f64>,
    translation: &na::Vector3<f64>,
) -> ProjectionMatrix {
    let mut rt = na::Matrix3x4::zeros();
    rt.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    rt.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    intrinsics.matrix() * rt
}

/// The first camera of every pair sits at the origin: `K * [I | 0]`.
pub fn canonical_projection(intrinsics: &Intrinsics) -> ProjectionMatrix {
    projection_matrix(intrinsics, &na::Matrix3::identity(), &na::Vector3::zeros())
}

/// Angle of `a^T * b` in radians.
pub fn rotation_angle_between(a: &na::Rotation3<f64>, b: &na::Rotation3<f64>) -> f64 {
    (a.inverse() * b).angle()
}
