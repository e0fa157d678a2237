use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while reconstructing a sparse cloud.
///
/// Pair- and point-level variants are recovered inside the pipeline; only
/// [`ReconstructionError::EmptyReconstruction`] and I/O failures reach callers
/// of [`crate::pipeline::Reconstructor`].
#[derive(Debug, Error)]
pub enum ReconstructionError {
    /// An image could not be opened or decoded.
    #[error("failed to load image {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    /// Not enough matches survived filtering to estimate a pose.
    #[error("need at least {required} correspondences, got {found}")]
    InsufficientCorrespondence { found: usize, required: usize },
    /// Robust estimation or pose disambiguation found no valid model.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    /// A single triangulated point failed validation.
    #[error("triangulated point rejected: {0}")]
    TriangulationInvalid(&'static str),
    /// No pair contributed a point.
    #[error("reconstruction produced an empty point cloud")]
    EmptyReconstruction,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, ReconstructionError>;
