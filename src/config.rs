use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cloud::FrameMode;
use crate::error::Result;
use crate::extractor::ExtractorConfig;
use crate::geometry::RansacConfig;
use crate::io::object_from_json;
use crate::matcher::MatcherConfig;
use crate::pipeline::PairSelection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub extractor: ExtractorConfig,
    pub matcher: MatcherConfig,
    pub ransac: RansacConfig,
    /// Pairs with fewer matches are skipped. Never below 8.
    pub min_correspondences: usize,
    /// Inliers triangulated per candidate when resolving the pose ambiguity.
    pub cheirality_samples: usize,
    pub pair_selection: PairSelection,
    pub frame_mode: FrameMode,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            matcher: MatcherConfig::default(),
            ransac: RansacConfig::default(),
            min_correspondences: 8,
            cheirality_samples: 50,
            pair_selection: PairSelection::default(),
            frame_mode: FrameMode::default(),
        }
    }
}

impl ReconstructionConfig {
    /// Missing fields fall back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<ReconstructionConfig> {
        object_from_json(path)
    }
}
