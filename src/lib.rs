//! Sparse point clouds from ordered, overlapping photographs.
//!
//! Every selected image pair goes through feature extraction, descriptor
//! matching, robust essential-matrix pose recovery and linear triangulation.
//! The resulting points are concatenated into one [`cloud::PointCloud`].

pub mod cloud;
pub mod config;
pub mod data_loader;
pub mod detected_points;
pub mod error;
pub mod extractor;
pub mod geometry;
pub mod io;
pub mod matcher;
pub mod pipeline;
pub mod types;

pub use config::ReconstructionConfig;
pub use error::{ReconstructionError, Result};
pub use pipeline::{Reconstruction, Reconstructor};
pub use types::Intrinsics;
