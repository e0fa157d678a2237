use std::io::Write;
use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::cloud::{FrameMode, PointCloud};
use crate::error::Result;
use crate::pipeline::{PairReport, PairStatus, Reconstruction};
use crate::types::{Intrinsics, PairId};

/// Serializes an object to a pretty-printed JSON file.
pub fn object_to_json<T: Serialize>(output_path: impl AsRef<Path>, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[derive(Serialize)]
struct PointCloudFile {
    frame_mode: FrameMode,
    count: usize,
    xyz: Vec<[f64; 3]>,
    pairs: Vec<PairId>,
}

/// Writes the cloud as `{"xyz": [[x, y, z], ...], "pairs": [...]}`.
pub fn write_point_cloud(
    output_path: impl AsRef<Path>,
    cloud: &PointCloud,
    frame_mode: FrameMode,
) -> Result<()> {
    let file = PointCloudFile {
        frame_mode,
        count: cloud.len(),
        xyz: cloud.to_xyz(),
        pairs: cloud.iter().map(|p| p.pair).collect(),
    };
    object_to_json(output_path, &file)
}

#[derive(Serialize)]
struct ReconstructionReport<'a> {
    timestamp: String,
    intrinsics: Intrinsics,
    frame_mode: FrameMode,
    image_count: usize,
    pair_count: usize,
    reconstructed_pairs: usize,
    total_points: usize,
    pairs: &'a [PairReport],
}

/// Writes per-pair statistics of a run.
pub fn write_report(
    output_path: impl AsRef<Path>,
    intrinsics: &Intrinsics,
    frame_mode: FrameMode,
    reconstruction: &Reconstruction,
) -> Result<()> {
    let timestamp = OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(&Rfc3339)
        .unwrap_or_default();
    let report = ReconstructionReport {
        timestamp,
        intrinsics: *intrinsics,
        frame_mode,
        image_count: reconstruction.image_count,
        pair_count: reconstruction.pairs.len(),
        reconstructed_pairs: reconstruction
            .pairs
            .iter()
            .filter(|p| p.status == PairStatus::Reconstructed)
            .count(),
        total_points: reconstruction.cloud.len(),
        pairs: &reconstruction.pairs,
    };
    object_to_json(output_path, &report)
}
