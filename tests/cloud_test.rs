use nalgebra as na;
use sparse_reconstruction::cloud::{FrameMode, Point3D, PointCloudAccumulator};
use sparse_reconstruction::pipeline::PairSelection;
use sparse_reconstruction::types::{PairId, Pose};
use sparse_reconstruction::{ReconstructionConfig, ReconstructionError};

fn pose(first: usize, second: usize, t: na::Vector3<f64>) -> Pose {
    Pose::new(PairId::new(first, second), na::Rotation3::identity(), t)
}

fn point(x: f64, pair: PairId) -> Point3D {
    Point3D::new(na::Point3::new(x, 0.0, 5.0), pair)
}

#[test]
fn test_local_mode_concatenates_untouched() {
    let mut acc = PointCloudAccumulator::new(FrameMode::Local);
    let p01 = pose(0, 1, na::Vector3::x());
    let p12 = pose(1, 2, na::Vector3::x());
    acc.add_pair(&p01, vec![point(1.0, p01.pair)]);
    acc.add_pair(&p12, vec![point(1.0, p12.pair), point(2.0, p12.pair)]);
    assert_eq!(acc.len(), 3);
    assert!(acc.camera_poses().is_empty());

    let cloud = acc.finish().unwrap();
    assert_eq!(cloud.len(), 3);
    assert_eq!(cloud.points[1].position, na::Point3::new(1.0, 0.0, 5.0));
    assert_eq!(cloud.points[1].pair, PairId::new(1, 2));
    assert_eq!(cloud.to_xyz()[2], [2.0, 0.0, 5.0]);
}

#[test]
fn test_chained_mode_composes_pair_poses() {
    let mut acc = PointCloudAccumulator::new(FrameMode::Chained);
    // x2 = x1 + t, so camera 1 sits at -t in camera 0's frame.
    let p01 = pose(0, 1, na::Vector3::new(-1.0, 0.0, 0.0));
    let p12 = pose(1, 2, na::Vector3::new(-1.0, 0.0, 0.0));
    acc.add_pair(&p01, vec![point(0.0, p01.pair)]);
    acc.add_pair(&p12, vec![point(0.0, p12.pair)]);
    let centre2 = acc.camera_poses()[&2].translation.vector;
    assert!((centre2 - na::Vector3::new(2.0, 0.0, 0.0)).norm() < 1e-12);
    let cloud = acc.finish().unwrap();
    assert!((cloud.points[1].position.x - 1.0).abs() < 1e-12);
}

#[test]
fn test_broken_chain_reanchors() {
    let mut acc = PointCloudAccumulator::new(FrameMode::Chained);
    let p01 = pose(0, 1, na::Vector3::x());
    let p23 = pose(2, 3, na::Vector3::x());
    acc.add_pair(&p01, vec![]);
    acc.add_pair(&p23, vec![point(0.5, p23.pair)]);
    assert_eq!(acc.camera_poses()[&2], na::Isometry3::identity());
    assert_eq!(acc.finish().unwrap().points[0].position.x, 0.5);
}

#[test]
fn test_empty_cloud_is_an_error() {
    let acc = PointCloudAccumulator::new(FrameMode::Local);
    assert!(acc.is_empty());
    assert!(matches!(
        acc.finish(),
        Err(ReconstructionError::EmptyReconstruction)
    ));
}

#[test]
fn test_adjacent_pairs() {
    assert_eq!(PairSelection::Adjacent.pairs(4), vec![(0, 1), (1, 2), (2, 3)]);
    assert!(PairSelection::Adjacent.pairs(1).is_empty());
    assert!(PairSelection::Adjacent.pairs(0).is_empty());
}

#[test]
fn test_all_and_window_pairs() {
    assert_eq!(PairSelection::All.pairs(3), vec![(0, 1), (0, 2), (1, 2)]);
    assert_eq!(
        PairSelection::Window { size: 2 }.pairs(4),
        vec![(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]
    );
    assert!(PairSelection::Window { size: 0 }.pairs(4).is_empty());
}

#[test]
fn test_huge_window_is_all_pairs() {
    assert_eq!(
        PairSelection::Window { size: usize::MAX }.pairs(3),
        PairSelection::All.pairs(3)
    );

    let config: ReconstructionConfig = serde_json::from_str(
        r#"{"pair_selection": {"kind": "window", "size": 18446744073709551615}}"#,
    )
    .unwrap();
    assert_eq!(config.pair_selection.pairs(4), PairSelection::All.pairs(4));
}
