use std::path::{Path, PathBuf};

use glob::glob;
use image::ImageReader;
use indicatif::ParallelProgressIterator;
use log::{trace, warn};
use rayon::prelude::*;

use crate::detected_points::{FrameFeature, Image};
use crate::error::{ReconstructionError, Result};
use crate::extractor::FeatureExtractor;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn img_filter(rp: glob::GlobResult) -> Option<PathBuf> {
    let p = rp.ok()?;
    let ext = p.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(p)
}

/// Image files directly under `root_folder`, sorted by path.
pub fn image_paths(root_folder: &str) -> Result<Vec<PathBuf>> {
    let pattern = Path::new(root_folder).join("*");
    let mut sorted_path: Vec<PathBuf> = glob(&pattern.to_string_lossy())?
        .filter_map(img_filter)
        .collect();
    sorted_path.sort();
    trace!("{} images in {}", sorted_path.len(), root_folder);
    Ok(sorted_path)
}

/// Decodes one image to grayscale.
pub fn load_image(index: usize, path: &Path) -> Result<Image> {
    let to_input_error = |source| ReconstructionError::Input {
        path: path.to_path_buf(),
        source,
    };
    let img = ImageReader::open(path)
        .map_err(|e| to_input_error(image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| to_input_error(image::ImageError::IoError(e)))?
        .decode()
        .map_err(to_input_error)?;
    Ok(Image::new(index, path, img.to_luma8()))
}

/// Loads and extracts features for every image of the folder in parallel.
///
/// Entry `i` belongs to the `i`-th path in sort order; images that fail to
/// load are `None` and have been logged.
pub fn load_frame_features(
    root_folder: &str,
    extractor: &FeatureExtractor,
) -> Result<Vec<Option<FrameFeature>>> {
    let paths = image_paths(root_folder)?;
    let frames = paths
        .par_iter()
        .enumerate()
        .progress_count(paths.len() as u64)
        .map(|(index, path)| match load_image(index, path) {
            Ok(img) => Some(extractor.extract(&img)),
            Err(e) => {
                warn!("skipping image: {}", e);
                None
            }
        })
        .collect();
    Ok(frames)
}
