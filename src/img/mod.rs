use std::path::Path;

use opencv::core::{Mat, Vector};
use opencv::imgcodecs::{imread, imwrite, IMREAD_COLOR, IMREAD_GRAYSCALE};
use opencv::prelude::*;
use serde::Deserialize;

use crate::error::VisionError;
use crate::roi::{StreamResolution, REFERENCE_RESOLUTION};

pub mod frame;
pub mod matcher;

/// Constant table driving OCR preparation.
///
/// OCR is most reliable with glyphs between roughly 30 and 70 pixels tall, so
/// smaller captures get upscaled harder. Captures at or below
/// `low_res_height` are usually stretched 4:3 sources and need a stronger
/// gamma, a lower threshold and a horizontal stretch.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OcrTuning {
    pub gamma: f64,
    pub threshold: f64,
    pub low_res_gamma: f64,
    pub low_res_threshold: f64,
    pub low_res_height: i32,
    pub aspect_stretch: f64,
    pub stretch_min_aspect: f64,
    /// (minimum height, scale) tiers, checked in order.
    pub scale_tiers: Vec<(i32, f64)>,
    pub fallback_scale: f64,
}

impl Default for OcrTuning {
    fn default() -> Self {
        OcrTuning {
            gamma: 2.5,
            threshold: 56.,
            low_res_gamma: 3.2,
            low_res_threshold: 46.,
            low_res_height: 480,
            aspect_stretch: 1.333,
            stretch_min_aspect: 0.75,
            scale_tiers: vec![(1080, 1.5), (720, 2.4)],
            fallback_scale: 3.,
        }
    }
}

impl OcrTuning {
    pub fn from_file(path: &Path) -> Result<OcrTuning, VisionError> {
        let text = std::fs::read_to_string(path)?;

        Ok(serde_json::from_str(&text)?)
    }

    pub fn scale_for(&self, height: i32) -> f64 {
        self.scale_tiers
            .iter()
            .find(|(min_height, _)| height >= *min_height)
            .map(|(_, scale)| *scale)
            .unwrap_or(self.fallback_scale)
    }
}

/// A grayscale reference image and the resolution it was cut from.
#[derive(Clone)]
pub struct Template {
    pub name: String,
    pub mat: Mat,
    pub resolution: StreamResolution,
}

unsafe impl Send for Template {}
unsafe impl Sync for Template {}

impl Template {
    pub fn new(name: String, mat: Mat, resolution: StreamResolution) -> Template {
        Template {
            name,
            mat,
            resolution,
        }
    }

    pub fn load(path: &Path) -> Result<Template, VisionError> {
        let mat = read_image(path, IMREAD_GRAYSCALE)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Template::new(name, mat, REFERENCE_RESOLUTION))
    }
}

pub fn read_color(path: &Path) -> Result<Mat, VisionError> {
    read_image(path, IMREAD_COLOR)
}

fn read_image(path: &Path, flags: i32) -> Result<Mat, VisionError> {
    debug!("reading image {}", path.display());
    let mat = imread(&path.to_string_lossy(), flags)?;

    if mat.rows() == 0 || mat.cols() == 0 {
        return Err(VisionError::ImageRead {
            path: path.to_path_buf(),
        });
    }

    Ok(mat)
}

pub fn write_image(path: &Path, mat: &Mat) -> Result<(), VisionError> {
    imwrite(&path.to_string_lossy(), mat, &Vector::new())?;

    Ok(())
}
