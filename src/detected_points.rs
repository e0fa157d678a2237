use std::path::PathBuf;

use image::GrayImage;

/// A decoded input photograph.
pub struct Image {
    pub index: usize,
    pub source: PathBuf,
    pub pixels: GrayImage,
}

impl Image {
    pub fn new(index: usize, source: impl Into<PathBuf>, pixels: GrayImage) -> Image {
        Image {
            index,
            source: source.into(),
            pixels,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keypoint {
    pub p2d: glam::Vec2,
    pub response: f32,
    pub descriptor: Vec<f32>,
}

impl Keypoint {
    pub fn new(p2d: glam::Vec2, descriptor: Vec<f32>) -> Keypoint {
        Keypoint {
            p2d,
            response: 0.0,
            descriptor,
        }
    }
}

/// Keypoints of one image, strongest first.
#[derive(Debug, Clone, Default)]
pub struct FrameFeature {
    pub index: usize,
    pub source: PathBuf,
    pub img_w_h: (u32, u32),
    pub keypoints: Vec<Keypoint>,
}

impl FrameFeature {
    pub fn descriptors(&self) -> Vec<&[f32]> {
        self.keypoints.iter().map(|k| k.descriptor.as_slice()).collect()
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}
