use std::borrow::Cow;

use image::GrayImage;
use imageproc::corners::{Corner, corners_fast9};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::detected_points::{FrameFeature, Image, Keypoint};

/// Samples per side of the descriptor patch.
const PATCH_GRID: usize = 8;
/// Pixel spacing between patch samples.
const PATCH_STEP: f32 = 2.0;
pub const DESCRIPTOR_LEN: usize = PATCH_GRID * PATCH_GRID;
/// Keypoints closer than this to the border cannot be described.
const BORDER: f32 = PATCH_STEP * (PATCH_GRID as f32 - 1.0) / 2.0 + 2.0;

/// Image conditioning applied before detection. Whatever is enabled here is
/// what the detector and the descriptor both see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preprocessing {
    pub equalize_histogram: bool,
    pub blur_sigma: Option<f32>,
}

impl Preprocessing {
    pub fn is_identity(&self) -> bool {
        !self.equalize_histogram && self.blur_sigma.is_none_or(|s| s <= 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub max_features: usize,
    pub fast_threshold: u8,
    pub preprocessing: Preprocessing,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_features: 3000,
            fast_threshold: 20,
            preprocessing: Preprocessing::default(),
        }
    }
}

/// FAST corners with a normalized intensity-patch descriptor.
///
/// Descriptors are zero-mean and unit-norm, so the Euclidean distance between
/// two of them is a monotone function of their normalized cross-correlation.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> FeatureExtractor {
        FeatureExtractor { config }
    }

    /// Applies the enabled preprocessing steps in order: equalization, then blur.
    pub fn preprocess<'a>(&self, img: &'a GrayImage) -> Cow<'a, GrayImage> {
        let pre = &self.config.preprocessing;
        let mut out = Cow::Borrowed(img);
        if pre.is_identity() {
            return out;
        }
        if pre.equalize_histogram {
            out = Cow::Owned(imageproc::contrast::equalize_histogram(&*out));
        }
        if let Some(sigma) = pre.blur_sigma.filter(|s| *s > 0.0) {
            out = Cow::Owned(imageproc::filter::gaussian_blur_f32(&*out, sigma));
        }
        out
    }

    pub fn extract(&self, image: &Image) -> FrameFeature {
        let keypoints = self.detect(&image.pixels);
        debug!(
            "image {} ({:?}): {} keypoints",
            image.index,
            image.source,
            keypoints.len()
        );
        FrameFeature {
            index: image.index,
            source: image.source.clone(),
            img_w_h: image.pixels.dimensions(),
            keypoints,
        }
    }

    /// Detects and describes up to `max_features` keypoints, strongest first.
    /// An empty result is valid.
    pub fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let conditioned = self.preprocess(img);
        let gray: &GrayImage = &conditioned;
        let (w, h) = gray.dimensions();
        if self.config.max_features == 0 || (w as f32) < 2.0 * BORDER || (h as f32) < 2.0 * BORDER
        {
            return Vec::new();
        }

        let corners = corners_fast9(gray, self.config.fast_threshold);
        let mut score_map = vec![0f32; (w * h) as usize];
        for c in &corners {
            score_map[(c.y * w + c.x) as usize] = c.score.max(f32::MIN_POSITIVE);
        }
        let mut candidates: Vec<Corner> = corners
            .into_iter()
            .filter(|c| is_local_max(&score_map, w, h, c.x, c.y))
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });

        let mut keypoints = Vec::with_capacity(self.config.max_features.min(candidates.len()));
        for c in candidates {
            if keypoints.len() >= self.config.max_features {
                break;
            }
            let p2d = refine_subpixel(&score_map, w, h, c.x, c.y);
            if p2d.x < BORDER
                || p2d.y < BORDER
                || p2d.x > w as f32 - 1.0 - BORDER
                || p2d.y > h as f32 - 1.0 - BORDER
            {
                continue;
            }
            match describe_patch(gray, p2d) {
                Some(descriptor) => keypoints.push(Keypoint {
                    p2d,
                    response: c.score,
                    descriptor,
                }),
                None => trace!("flat patch at {:?}", p2d),
            }
        }
        keypoints
    }
}

fn is_local_max(score_map: &[f32], w: u32, h: u32, x: u32, y: u32) -> bool {
    let s = score_map[(y * w + x) as usize];
    for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
            if nx == x && ny == y {
                continue;
            }
            let sn = score_map[(ny * w + nx) as usize];
            if sn > s || (sn == s && (ny, nx) < (y, x)) {
                return false;
            }
        }
    }
    true
}

/// Vertex of the parabola through three samples, as an offset from the middle.
fn parabola_peak(left: f32, mid: f32, right: f32) -> f32 {
    let denom = left - 2.0 * mid + right;
    if denom.abs() < f32::EPSILON {
        0.0
    } else {
        (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
    }
}

fn refine_subpixel(score_map: &[f32], w: u32, h: u32, x: u32, y: u32) -> glam::Vec2 {
    let at = |xx: u32, yy: u32| score_map[(yy * w + xx) as usize];
    let s = at(x, y);
    let dx = if x > 0 && x + 1 < w {
        parabola_peak(at(x - 1, y), s, at(x + 1, y))
    } else {
        0.0
    };
    let dy = if y > 0 && y + 1 < h {
        parabola_peak(at(x, y - 1), s, at(x, y + 1))
    } else {
        0.0
    };
    glam::Vec2::new(x as f32 + dx, y as f32 + dy)
}

fn bilinear(img: &GrayImage, x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as u32, y0 as u32);
    let p = |xx: u32, yy: u32| img.get_pixel(xx, yy)[0] as f32;
    let top = p(x0, y0) * (1.0 - fx) + p(x0 + 1, y0) * fx;
    let bottom = p(x0, y0 + 1) * (1.0 - fx) + p(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Zero-mean, unit-norm samples of the patch around `center`.
/// `None` for a patch without texture.
fn describe_patch(img: &GrayImage, center: glam::Vec2) -> Option<Vec<f32>> {
    let half = PATCH_STEP * (PATCH_GRID as f32 - 1.0) / 2.0;
    let mut samples = Vec::with_capacity(DESCRIPTOR_LEN);
    for r in 0..PATCH_GRID {
        for c in 0..PATCH_GRID {
            let x = center.x - half + c as f32 * PATCH_STEP;
            let y = center.y - half + r as f32 * PATCH_STEP;
            samples.push(bilinear(img, x, y));
        }
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    samples.iter_mut().for_each(|v| *v -= mean);
    let norm = samples.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm < 1e-3 {
        return None;
    }
    samples.iter_mut().for_each(|v| *v /= norm);
    Some(samples)
}
