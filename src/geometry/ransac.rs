//! Seeded RANSAC over any [`Estimator`].
//!
//! The loop never panics: without consensus it returns a [`RansacResult`]
//! whose `model` is `None`.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    /// Inlier threshold on the residual, in pixels.
    pub threshold_px: f64,
    pub max_iters: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            confidence: 0.999,
            threshold_px: 1.0,
            max_iters: 2000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    pub model: Option<M>,
    pub inlier_mask: Vec<bool>,
    pub num_inliers: usize,
    pub inlier_rms: f64,
    pub iters: usize,
}

impl<M> RansacResult<M> {
    fn empty(len: usize) -> Self {
        Self {
            model: None,
            inlier_mask: vec![false; len],
            num_inliers: 0,
            inlier_rms: f64::INFINITY,
            iters: 0,
        }
    }
}

pub trait Estimator {
    type Datum;
    type Model;

    const MIN_SAMPLES: usize;

    /// `None` when the sample is degenerate.
    fn fit(&self, data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual in the units of `threshold_px`.
    fn residual(&self, model: &Self::Model, datum: &Self::Datum) -> f64;

    /// Re-estimate from the full consensus set. Default keeps the sampled model.
    fn refit(&self, _data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

/// Iterations needed to reach `confidence` at the observed inlier ratio.
fn adaptive_iterations(confidence: f64, inlier_ratio: f64, min_samples: usize, max_iters: usize) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }
    if inlier_ratio >= 1.0 {
        return 1;
    }
    let denom = (1.0 - inlier_ratio.powi(min_samples as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }
    let n = ((1.0 - confidence.min(1.0 - 1e-12)).ln() / denom).ceil();
    (n as usize).min(max_iters)
}

fn score<E: Estimator>(
    estimator: &E,
    model: &E::Model,
    data: &[E::Datum],
    threshold: f64,
) -> (Vec<usize>, f64) {
    let mut inliers = Vec::new();
    let mut ss = 0.0;
    for (i, d) in data.iter().enumerate() {
        let r = estimator.residual(model, d);
        if r.is_finite() && r <= threshold {
            inliers.push(i);
            ss += r * r;
        }
    }
    let rms = if inliers.is_empty() {
        f64::INFINITY
    } else {
        (ss / inliers.len() as f64).sqrt()
    };
    (inliers, rms)
}

/// Upper bound on consensus refits per accepted sample.
const MAX_REFINEMENTS: usize = 10;

/// Refits on the consensus set until it stops growing (or stops lowering the
/// RMS at equal size).
fn refine<E: Estimator>(
    estimator: &E,
    data: &[E::Datum],
    threshold: f64,
    mut model: E::Model,
    mut inliers: Vec<usize>,
    mut rms: f64,
) -> (E::Model, Vec<usize>, f64) {
    for _ in 0..MAX_REFINEMENTS {
        let Some(refit) = estimator.refit(data, &inliers) else {
            break;
        };
        let (refit_inliers, refit_rms) = score(estimator, &refit, data, threshold);
        let improves = refit_inliers.len() > inliers.len()
            || (refit_inliers.len() == inliers.len() && refit_rms < rms);
        if !improves {
            break;
        }
        model = refit;
        inliers = refit_inliers;
        rms = refit_rms;
    }
    (model, inliers, rms)
}

/// Runs RANSAC. Models with fewer than `min_inliers` inliers are never kept.
pub fn ransac<E: Estimator>(
    estimator: &E,
    data: &[E::Datum],
    config: &RansacConfig,
    min_inliers: usize,
) -> RansacResult<E::Model> {
    let mut best = RansacResult::empty(data.len());
    if data.len() < E::MIN_SAMPLES {
        return best;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut best_inliers: Vec<usize> = Vec::new();
    let mut max_iters = config.max_iters.max(1);
    let mut iters = 0;
    while iters < max_iters {
        iters += 1;
        let sample = rand::seq::index::sample(&mut rng, data.len(), E::MIN_SAMPLES).into_vec();
        let Some(model) = estimator.fit(data, &sample) else {
            continue;
        };
        let (inliers, rms) = score(estimator, &model, data, config.threshold_px);
        if inliers.len() < min_inliers.max(E::MIN_SAMPLES) {
            continue;
        }
        let (model, inliers, rms) = refine(estimator, data, config.threshold_px, model, inliers, rms);

        let better = best.model.is_none()
            || inliers.len() > best_inliers.len()
            || (inliers.len() == best_inliers.len() && rms < best.inlier_rms);
        if better {
            best.model = Some(model);
            best.inlier_rms = rms;
            best.iters = iters;
            best_inliers = inliers;
            let ratio = best_inliers.len() as f64 / data.len() as f64;
            max_iters = adaptive_iterations(config.confidence, ratio, E::MIN_SAMPLES, config.max_iters)
                .max(iters);
        }
    }

    best.num_inliers = best_inliers.len();
    for i in best_inliers {
        best.inlier_mask[i] = true;
    }
    best
}
