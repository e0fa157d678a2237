pub mod essential;
pub mod pose;
pub mod ransac;
pub mod triangulation;

pub use pose::{PoseEstimate, PoseEstimator};
pub use ransac::RansacConfig;
pub use triangulation::Triangulator;
