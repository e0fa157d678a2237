use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A correspondence between keypoint `query_idx` of the first image and
/// keypoint `train_idx` of the second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

impl Match {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> Match {
        Match {
            query_idx,
            train_idx,
            distance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchFilter {
    /// Keep a pair only when each side is the other's nearest neighbor.
    MutualNearest,
    /// Lowe's test: `best < threshold * second_best`.
    Ratio { threshold: f32 },
}

impl Default for MatchFilter {
    fn default() -> Self {
        MatchFilter::Ratio { threshold: 0.7 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub filter: MatchFilter,
    /// Optional absolute gate applied after the filter.
    pub max_distance: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
struct Neighbors {
    best_idx: usize,
    best: f32,
    second: Option<f32>,
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn nearest_two(query: &[f32], train: &[&[f32]]) -> Option<Neighbors> {
    let mut out: Option<Neighbors> = None;
    for (idx, t) in train.iter().enumerate() {
        let d = euclidean_distance(query, t);
        out = Some(match out {
            None => Neighbors {
                best_idx: idx,
                best: d,
                second: None,
            },
            Some(n) if d < n.best => Neighbors {
                best_idx: idx,
                best: d,
                second: Some(n.best),
            },
            Some(n) if n.second.is_none_or(|s| d < s) => Neighbors {
                second: Some(d),
                ..n
            },
            Some(n) => n,
        });
    }
    out
}

/// Brute-force nearest-neighbor matcher over real-valued descriptors.
#[derive(Debug, Clone, Default)]
pub struct FeatureMatcher {
    config: MatcherConfig,
}

impl FeatureMatcher {
    pub fn new(config: MatcherConfig) -> FeatureMatcher {
        FeatureMatcher { config }
    }

    /// Matches sorted by ascending distance. Empty inputs give no matches.
    pub fn match_descriptors(&self, query: &[&[f32]], train: &[&[f32]]) -> Vec<Match> {
        if query.is_empty() || train.is_empty() {
            return Vec::new();
        }
        let forward: Vec<Option<Neighbors>> =
            query.par_iter().map(|q| nearest_two(q, train)).collect();

        let mut matches: Vec<Match> = match self.config.filter {
            MatchFilter::Ratio { threshold } => forward
                .iter()
                .enumerate()
                .filter_map(|(qi, n)| {
                    let n = n.as_ref()?;
                    let second = n.second?;
                    (n.best < threshold * second).then(|| Match::new(qi, n.best_idx, n.best))
                })
                .collect(),
            MatchFilter::MutualNearest => {
                let backward: Vec<Option<usize>> = train
                    .par_iter()
                    .map(|t| nearest_two(t, query).map(|n| n.best_idx))
                    .collect();
                forward
                    .iter()
                    .enumerate()
                    .filter_map(|(qi, n)| {
                        let n = n.as_ref()?;
                        (backward[n.best_idx] == Some(qi))
                            .then(|| Match::new(qi, n.best_idx, n.best))
                    })
                    .collect()
            }
        };

        if let Some(max_distance) = self.config.max_distance {
            matches.retain(|m| m.distance <= max_distance);
        }
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!(
            "{} x {} descriptors -> {} matches",
            query.len(),
            train.len(),
            matches.len()
        );
        matches
    }
}
