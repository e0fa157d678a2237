use nalgebra as na;
use sparse_reconstruction::ReconstructionError;
use sparse_reconstruction::geometry::essential::{
    decompose_essential, essential_8point, essential_to_fundamental, sampson_distance,
};
use sparse_reconstruction::geometry::ransac::{Estimator, ransac};
use sparse_reconstruction::geometry::triangulation::depth;
use sparse_reconstruction::geometry::{PoseEstimator, RansacConfig, Triangulator};
use sparse_reconstruction::types::{
    Intrinsics, PairId, canonical_projection, projection_matrix, rotation_angle_between,
};

struct LineEstimator;

impl Estimator for LineEstimator {
    type Datum = (f64, f64);
    type Model = (f64, f64);
    const MIN_SAMPLES: usize = 2;

    fn fit(&self, data: &[(f64, f64)], sample: &[usize]) -> Option<(f64, f64)> {
        let (x0, y0) = data[sample[0]];
        let (x1, y1) = data[sample[1]];
        if (x1 - x0).abs() < 1e-9 {
            return None;
        }
        let slope = (y1 - y0) / (x1 - x0);
        Some((slope, y0 - slope * x0))
    }

    fn residual(&self, m: &(f64, f64), d: &(f64, f64)) -> f64 {
        (m.0 * d.0 + m.1 - d.1).abs() / (m.0 * m.0 + 1.0).sqrt()
    }
}

/// 1D location: one sample seeds the model, the consensus mean refines it.
struct MeanEstimator;

impl Estimator for MeanEstimator {
    type Datum = f64;
    type Model = f64;
    const MIN_SAMPLES: usize = 1;

    fn fit(&self, data: &[f64], sample: &[usize]) -> Option<f64> {
        Some(data[sample[0]])
    }

    fn residual(&self, m: &f64, d: &f64) -> f64 {
        (d - m).abs()
    }

    fn refit(&self, data: &[f64], inliers: &[usize]) -> Option<f64> {
        Some(inliers.iter().map(|&i| data[i]).sum::<f64>() / inliers.len() as f64)
    }
}

fn line_with_outliers() -> Vec<(f64, f64)> {
    let mut data: Vec<_> = (0..30).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
    data.extend([(3.0, 40.0), (7.0, -12.0), (15.0, 2.0), (21.0, 90.0)]);
    data
}

fn skew(v: &na::Vector3<f64>) -> na::Matrix3<f64> {
    na::Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

fn reference_k() -> Intrinsics {
    Intrinsics::new(495.21153939, 504.81851369, 335.75450282, 179.00894773)
}

fn small_scene() -> (na::Rotation3<f64>, na::Vector3<f64>, Vec<na::Point3<f64>>) {
    let rot = na::Rotation3::from_euler_angles(0.05, -0.1, 0.02);
    let t = na::Vector3::new(-1.0, 0.1, 0.2);
    let pts = (0..20)
        .map(|i| {
            na::Point3::new(
                (i % 5) as f64 * 0.6 - 1.2,
                (i / 5) as f64 * 0.5 - 0.8,
                4.0 + ((i * 7) % 11) as f64 * 0.3,
            )
        })
        .collect();
    (rot, t, pts)
}

type PixelScene = (
    na::Rotation3<f64>,
    na::Vector3<f64>,
    Vec<na::Point2<f64>>,
    Vec<na::Point2<f64>>,
);

fn pixel_scene(n: usize) -> PixelScene {
    let k = reference_k();
    let rot = na::Rotation3::from_euler_angles(0.02, 0.12, -0.03);
    let t = na::Vector3::new(-0.9, 0.05, 0.15);
    let (a, b) = (0..n)
        .map(|i| {
            let p = na::Point3::new(
                (i % 8) as f64 * 0.4 - 1.4,
                (i / 8) as f64 * 0.3 - 0.6,
                5.0 + ((i * 7) % 11) as f64 * 0.35,
            );
            (k.project(&p), k.project(&(rot * p + t)))
        })
        .unzip();
    (rot, t, a, b)
}

#[test]
fn test_ransac_finds_line_despite_outliers() {
    let data = line_with_outliers();
    let res = ransac(&LineEstimator, &data, &RansacConfig::default(), 10);
    let (slope, intercept) = res.model.unwrap();
    assert!((slope - 2.0).abs() < 1e-9);
    assert!((intercept - 1.0).abs() < 1e-9);
    assert_eq!(res.num_inliers, 30);
    assert!(!res.inlier_mask[30..].iter().any(|&b| b));
}

#[test]
fn test_ransac_too_few_points_yield_no_model() {
    let res = ransac(&LineEstimator, &[(0.0, 0.0)], &RansacConfig::default(), 1);
    assert!(res.model.is_none());
    assert_eq!(res.inlier_mask, vec![false]);
    assert_eq!(res.num_inliers, 0);
}

#[test]
fn test_ransac_rejects_models_below_min_inliers() {
    let data = line_with_outliers();
    let res = ransac(&LineEstimator, &data, &RansacConfig::default(), 31);
    assert!(res.model.is_none());
}

#[test]
fn test_ransac_same_seed_same_result() {
    let data = line_with_outliers();
    let a = ransac(&LineEstimator, &data, &RansacConfig::default(), 10);
    let b = ransac(&LineEstimator, &data, &RansacConfig::default(), 10);
    assert_eq!(a.inlier_mask, b.inlier_mask);
    assert_eq!(a.iters, b.iters);
}

#[test]
fn test_ransac_refits_until_consensus_settles() {
    // From an end point a single refit only reaches 8 of 10 values; repeated
    // refits walk the mean to the centre and take in all of them.
    let data: Vec<f64> = (0..10).map(|i| i as f64).collect();
    for seed in 0..20 {
        let config = RansacConfig {
            threshold_px: 5.0,
            max_iters: 1,
            seed,
            ..Default::default()
        };
        let res = ransac(&MeanEstimator, &data, &config, 1);
        assert_eq!(res.num_inliers, 10, "seed {}", seed);
        assert_eq!(res.model, Some(4.5));
    }
}

#[test]
fn test_eight_point_satisfies_epipolar_constraint() {
    let (rot, t, pts) = small_scene();
    let (n1, n2): (Vec<_>, Vec<_>) = pts
        .iter()
        .map(|p| {
            let q = rot * p + t;
            (na::Point2::new(p.x / p.z, p.y / p.z), na::Point2::new(q.x / q.z, q.y / q.z))
        })
        .unzip();
    let e = essential_8point(&n1, &n2).unwrap();
    for (a, b) in n1.iter().zip(&n2) {
        let r = b.to_homogeneous().dot(&(e * a.to_homogeneous()));
        assert!(r.abs() < 1e-9, "epipolar residual {}", r);
    }
    let expected = skew(&t) * rot.matrix();
    let expected = expected / expected.norm();
    assert!((e - expected).norm() < 1e-6 || (e + expected).norm() < 1e-6);
}

#[test]
fn test_decomposition_contains_ground_truth() {
    let (rot, t, _) = small_scene();
    let candidates = decompose_essential(&(skew(&t) * rot.matrix())).unwrap();
    let t_dir = t.normalize();
    assert!(candidates.iter().any(|(r, tt)| {
        rotation_angle_between(r, &rot) < 1e-6 && (tt - t_dir).norm() < 1e-9
    }));
    for (r, tt) in &candidates {
        assert!((r.matrix().determinant() - 1.0).abs() < 1e-9);
        assert!((tt.norm() - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_sampson_distance_grows_off_the_epipolar_line() {
    let (rot, t, pts) = small_scene();
    let k = Intrinsics::new(500.0, 500.0, 320.0, 240.0);
    let f = essential_to_fundamental(&(skew(&t) * rot.matrix()), &k);
    let p = pts[3];
    let x1 = k.project(&p);
    let x2 = k.project(&(rot * p + t));
    assert!(sampson_distance(&f, &x1, &x2) < 1e-8);
    let moved = na::Point2::new(x2.x, x2.y + 5.0);
    assert!(sampson_distance(&f, &x1, &moved) > 1.0);
}

#[test]
fn test_coincident_points_are_rejected() {
    let p = vec![na::Point2::new(0.1, 0.1); 8];
    assert!(essential_8point(&p, &p).is_none());
}

#[test]
fn test_triangulation_recovers_exact_point() {
    let k = reference_k();
    let rot = na::Rotation3::from_euler_angles(0.0, 0.1, 0.0);
    let t = na::Vector3::new(-0.8, 0.0, 0.1);
    let p2 = projection_matrix(&k, rot.matrix(), &t);
    let x = na::Point3::new(0.3, -0.2, 5.0);
    let tri = Triangulator::new(canonical_projection(&k), p2);
    let got = tri
        .triangulate_one(&k.project(&x), &k.project(&(rot * x + t)))
        .unwrap();
    assert!((got - x).norm() < 1e-8);
    assert!((depth(&p2, &got) - (rot * x + t).z).abs() < 1e-8);
}

#[test]
fn test_identical_views_triangulate_nothing() {
    let p = canonical_projection(&reference_k());
    let tri = Triangulator::new(p, p);
    let pts: Vec<_> = (0..10)
        .map(|i| na::Point2::new(100.0 + 30.0 * i as f64, 80.0 + 12.0 * i as f64))
        .collect();
    assert!(tri.triangulate(PairId::new(0, 1), &pts, &pts).is_empty());
}

#[test]
fn test_points_behind_the_cameras_are_dropped() {
    let k = reference_k();
    let t = na::Vector3::new(-1.0, 0.0, 0.0);
    let tri = Triangulator::new(
        canonical_projection(&k),
        projection_matrix(&k, &na::Matrix3::identity(), &t),
    );
    let behind = na::Point3::new(0.2, 0.1, -4.0);
    // The pinhole projection still maps it; the rays meet behind both cameras.
    let x1 = k.project(&behind);
    let x2 = k.project(&(behind + t));
    assert!(matches!(
        tri.triangulate_one(&x1, &x2),
        Err(ReconstructionError::TriangulationInvalid(_))
    ));
    let front = na::Point3::new(0.2, 0.1, 4.0);
    let kept = tri.triangulate(
        PairId::new(0, 1),
        &[x1, k.project(&front)],
        &[x2, k.project(&(front + t))],
    );
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].pair, PairId::new(0, 1));
}

#[test]
fn test_pose_recovers_known_motion() {
    let (rot, t, a, b) = pixel_scene(40);
    let est = PoseEstimator::new(reference_k(), RansacConfig::default(), 8, 50)
        .estimate(&a, &b)
        .unwrap();
    assert!(rotation_angle_between(&est.rotation, &rot) < 1e-6);
    let cos = est.translation.dot(&t.normalize());
    assert!(cos > 1.0 - 1e-9, "translation direction off: {}", cos);
    assert!((est.translation.norm() - 1.0).abs() < 1e-12);
    assert_eq!(est.num_inliers, 40);
    assert!(est.inlier_mask.iter().all(|&m| m));
}

#[test]
fn test_pose_masks_gross_outliers() {
    let (rot, _, a, mut b) = pixel_scene(40);
    for i in [3, 11, 27] {
        b[i].y += 40.0;
    }
    let est = PoseEstimator::new(reference_k(), RansacConfig::default(), 8, 50)
        .estimate(&a, &b)
        .unwrap();
    assert_eq!(est.num_inliers, 37);
    assert!(!est.inlier_mask[3] && !est.inlier_mask[11] && !est.inlier_mask[27]);
    assert!(rotation_angle_between(&est.rotation, &rot) < 1e-6);
}

#[test]
fn test_pose_needs_eight_correspondences() {
    let (_, _, a, b) = pixel_scene(7);
    let err = PoseEstimator::new(reference_k(), RansacConfig::default(), 8, 50)
        .estimate(&a, &b)
        .unwrap_err();
    assert!(matches!(
        err,
        ReconstructionError::InsufficientCorrespondence { found: 7, required: 8 }
    ));
}

#[test]
fn test_pose_floor_is_never_below_solver_minimum() {
    let estimator = PoseEstimator::new(reference_k(), RansacConfig::default(), 3, 50);
    assert_eq!(estimator.min_correspondences(), 8);
}

#[test]
fn test_pose_random_correspondences_are_degenerate() {
    let (_, _, a, _) = pixel_scene(40);
    let b: Vec<_> = (0..40)
        .map(|i| na::Point2::new(((i * 97) % 640) as f64, ((i * 61) % 360) as f64))
        .collect();
    let res = PoseEstimator::new(reference_k(), RansacConfig::default(), 30, 50).estimate(&a, &b);
    assert!(matches!(res, Err(ReconstructionError::DegenerateGeometry(_))));
}
