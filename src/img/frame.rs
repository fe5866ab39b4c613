use chrono::{DateTime, Utc};
use opencv::{
    core::{lut, Mat, Point, Range, Rect, Size},
    imgproc::{cvt_color, resize, threshold, COLOR_BGR2GRAY, COLOR_BGRA2GRAY, INTER_CUBIC, THRESH_BINARY},
    prelude::*,
};

use crate::error::VisionError;
use crate::img::{matcher, OcrTuning, Template};
use crate::roi::{RegionOfInterest, StreamResolution};

/// A captured frame. Every operation hands back a new frame and leaves the
/// source untouched, so frames can be shared across worker threads.
#[derive(Clone)]
pub struct Frame {
    pub mat: Mat,
    pub num: i64,
    pub captured_at: DateTime<Utc>,
}

// the mat is never written after construction
unsafe impl Send for Frame {}
unsafe impl Sync for Frame {}

impl Frame {
    pub fn new(mat: Mat, num: i64) -> Frame {
        Frame {
            mat,
            num,
            captured_at: Utc::now(),
        }
    }

    fn with_mat(&self, mat: Mat) -> Frame {
        Frame {
            mat,
            num: self.num,
            captured_at: self.captured_at,
        }
    }

    pub fn resolution(&self) -> StreamResolution {
        StreamResolution::new(self.mat.cols(), self.mat.rows())
    }

    /// Bring the whole frame into another resolution with bicubic resampling.
    pub fn rescale(&self, to: StreamResolution) -> Result<Frame, VisionError> {
        if self.resolution() == to {
            return Ok(self.clone());
        }

        self.resize_to(to.size())
    }

    pub fn resize_to(&self, size: Size) -> Result<Frame, VisionError> {
        let mut resized = Mat::default();
        resize(&self.mat, &mut resized, size, 0., 0., INTER_CUBIC)?;

        Ok(self.with_mat(resized))
    }

    pub fn scale(&self, factor: f64) -> Result<Frame, VisionError> {
        let size = Size::new(
            (self.mat.cols() as f64 * factor) as i32,
            (self.mat.rows() as f64 * factor) as i32,
        );

        self.resize_to(size)
    }

    pub fn to_gray(&self) -> Result<Frame, VisionError> {
        let code = match self.mat.channels() {
            1 => return Ok(self.clone()),
            4 => COLOR_BGRA2GRAY,
            _ => COLOR_BGR2GRAY,
        };

        let mut gray = Mat::default();
        cvt_color(&self.mat, &mut gray, code, 0)?;

        Ok(self.with_mat(gray))
    }

    /// Remap each 8-bit value `v` to `255 * (v / 255) ^ gamma`.
    pub fn gamma_correct(&self, gamma: f64) -> Result<Frame, VisionError> {
        let table: Vec<u8> = (0..=255u32)
            .map(|v| ((v as f64 / 255.).powf(gamma) * 255.) as u8)
            .collect();
        let table = Mat::from_slice(&table)?;

        let mut corrected = Mat::default();
        lut(&self.mat, &table, &mut corrected)?;

        Ok(self.with_mat(corrected))
    }

    /// Pixels at or above `level` become 255, everything else 0.
    pub fn threshold_binary(&self, level: f64) -> Result<Frame, VisionError> {
        let mut binary = Mat::default();
        threshold(&self.mat, &mut binary, level.ceil() - 1., 255., THRESH_BINARY)?;

        Ok(self.with_mat(binary))
    }

    /// Grayscale, upscale, gamma and binarize the frame so OCR sees dark,
    /// well-sized glyphs on a flat background.
    pub fn prepare_for_ocr(&self, tuning: &OcrTuning) -> Result<Frame, VisionError> {
        let height = self.mat.rows();
        let width = self.mat.cols();
        let scale = tuning.scale_for(height);
        let mut gamma = tuning.gamma;
        let mut level = tuning.threshold;
        let mut frame = self.clone();

        if height <= tuning.low_res_height {
            gamma = tuning.low_res_gamma;
            level = tuning.low_res_threshold;

            if height as f64 / width as f64 >= tuning.stretch_min_aspect {
                let stretched = (width as f64 * tuning.aspect_stretch).floor() as i32;
                debug!("frame {}\tstretching {} -> {}", self.num, width, stretched);
                frame = frame.resize_to(Size::new(stretched, height))?;
            }
        }

        frame
            .to_gray()?
            .scale(scale)?
            .gamma_correct(gamma)?
            .threshold_binary(level)
    }

    /// Crop a region, first mapping it from the resolution it was defined in.
    pub fn extract_roi(&self, region: &RegionOfInterest) -> Result<Frame, VisionError> {
        let region = region.rescale(self.resolution());

        Ok(self.with_mat(crop(&self.mat, region.rect())?))
    }

    /// Locate `template` in this frame. The template is brought into the
    /// frame's resolution and both are compared in grayscale.
    pub fn find_template(
        &self,
        template: &Template,
        threshold: f64,
    ) -> Result<Option<Point>, VisionError> {
        let gray = self.to_gray()?;
        let templ = rescale_mat(&template.mat, template.resolution, self.resolution())?;

        let found = matcher::match_template(&gray.mat, &templ, threshold)?;
        if let Some(point) = found {
            debug!("frame {}\ttemplate {} at {:?}", self.num, template.name, point);
        }

        Ok(found)
    }

    pub fn similarity(&self, other: &Frame) -> Result<f64, VisionError> {
        matcher::similarity(&self.mat, &other.mat)
    }
}

/// Resize `mat` by the ratio between two resolutions; a no-op when they match.
pub fn rescale_mat(
    mat: &Mat,
    from: StreamResolution,
    to: StreamResolution,
) -> Result<Mat, VisionError> {
    if from == to {
        return Ok(mat.clone());
    }

    let (width_ratio, height_ratio) = from.ratios_to(to);
    let size = Size::new(
        (mat.cols() as f32 * width_ratio) as i32,
        (mat.rows() as f32 * height_ratio) as i32,
    );

    let mut resized = Mat::default();
    resize(mat, &mut resized, size, 0., 0., INTER_CUBIC)?;

    Ok(resized)
}

/// Deep copy of a rectangular area of `mat`.
pub fn crop(mat: &Mat, rect: Rect) -> Result<Mat, VisionError> {
    let view = mat
        .col_range(&Range::new(rect.x, rect.x + rect.width)?)?
        .row_range(&Range::new(rect.y, rect.y + rect.height)?)?;

    let mut cropped = Mat::default();
    view.copy_to(&mut cropped)?;

    Ok(cropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::new_region;
    use opencv::core::{Scalar, CV_8UC3};
    use opencv::imgproc::rectangle;

    fn solid(width: i32, height: i32, value: f64) -> Mat {
        Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(value)).unwrap()
    }

    fn fill(mat: &mut Mat, rect: Rect, value: f64) {
        rectangle(mat, rect, Scalar::all(value), -1, 8, 0).unwrap();
    }

    fn is_binary(mat: &Mat) -> bool {
        mat.data_bytes().unwrap().iter().all(|v| *v == 0 || *v == 255)
    }

    #[test]
    fn rescale_to_same_resolution_keeps_size() {
        let frame = Frame::new(solid(1280, 720, 40.), 3);
        let same = frame.rescale(StreamResolution::HD720p).unwrap();

        assert_eq!(same.resolution(), StreamResolution::HD720p);
        assert_eq!(same.num, 3);
    }

    #[test]
    fn rescale_hits_target_resolution() {
        let frame = Frame::new(solid(1920, 1080, 40.), 0);
        let smaller = frame.rescale(StreamResolution::HD720p).unwrap();

        assert_eq!(smaller.resolution(), StreamResolution::HD720p);
        assert_eq!(smaller.mat.channels(), 3);
        // source untouched
        assert_eq!(frame.resolution(), StreamResolution::HD1080p);
    }

    #[test]
    fn gamma_darkens_midtones() {
        let frame = Frame::new(solid(4, 4, 128.), 0).to_gray().unwrap();
        let corrected = frame.gamma_correct(2.5).unwrap();

        assert_eq!(*corrected.mat.at_2d::<u8>(0, 0).unwrap(), 45);
        assert_eq!(*frame.mat.at_2d::<u8>(0, 0).unwrap(), 128);
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut mat = solid(3, 1, 0.);
        fill(&mut mat, Rect::new(0, 0, 1, 1), 55.);
        fill(&mut mat, Rect::new(1, 0, 1, 1), 56.);
        fill(&mut mat, Rect::new(2, 0, 1, 1), 57.);

        let binary = Frame::new(mat, 0)
            .to_gray()
            .unwrap()
            .threshold_binary(56.)
            .unwrap();

        assert_eq!(*binary.mat.at_2d::<u8>(0, 0).unwrap(), 0);
        assert_eq!(*binary.mat.at_2d::<u8>(0, 1).unwrap(), 255);
        assert_eq!(*binary.mat.at_2d::<u8>(0, 2).unwrap(), 255);
    }

    #[test]
    fn prepare_hd_frame() {
        let mut mat = solid(1920, 1080, 128.);
        fill(&mut mat, Rect::new(960, 0, 960, 1080), 200.);

        let prepared = Frame::new(mat, 0)
            .prepare_for_ocr(&OcrTuning::default())
            .unwrap();

        assert_eq!(prepared.mat.channels(), 1);
        assert_eq!(prepared.resolution(), StreamResolution::new(2880, 1620));
        assert!(is_binary(&prepared.mat));
        // 128 -> 45 after gamma, under 56; 200 -> 138, over it
        assert_eq!(*prepared.mat.at_2d::<u8>(100, 100).unwrap(), 0);
        assert_eq!(*prepared.mat.at_2d::<u8>(100, 2700).unwrap(), 255);
    }

    #[test]
    fn prepare_720_frame_scales_up_more() {
        let prepared = Frame::new(solid(1280, 720, 90.), 0)
            .prepare_for_ocr(&OcrTuning::default())
            .unwrap();

        assert_eq!(prepared.resolution(), StreamResolution::new(3072, 1728));
        assert!(is_binary(&prepared.mat));
    }

    #[test]
    fn prepare_stretches_low_res_four_by_three() {
        let prepared = Frame::new(solid(640, 480, 90.), 0)
            .prepare_for_ocr(&OcrTuning::default())
            .unwrap();

        // 640 * 1.333 = 853.12 -> 853, then 3x
        assert_eq!(prepared.resolution(), StreamResolution::new(2559, 1440));
    }

    #[test]
    fn prepare_leaves_low_res_widescreen_unstretched() {
        let prepared = Frame::new(solid(854, 480, 90.), 0)
            .prepare_for_ocr(&OcrTuning::default())
            .unwrap();

        assert_eq!(prepared.resolution(), StreamResolution::new(2562, 1440));
    }

    #[test]
    fn low_res_uses_its_own_threshold() {
        // (100/255)^3.2 * 255 = 12.7, under 46 -> black.
        // (200/255)^3.2 * 255 = 117.2, over 46 -> white.
        let mut mat = solid(640, 360, 100.);
        fill(&mut mat, Rect::new(320, 0, 320, 360), 200.);

        let prepared = Frame::new(mat, 0)
            .prepare_for_ocr(&OcrTuning::default())
            .unwrap();

        assert_eq!(*prepared.mat.at_2d::<u8>(50, 50).unwrap(), 0);
        assert_eq!(*prepared.mat.at_2d::<u8>(50, 1800).unwrap(), 255);
    }

    #[test]
    fn extract_roi_maps_region_into_frame_resolution() {
        let mut mat = solid(1280, 720, 0.);
        fill(&mut mat, Rect::new(640, 360, 200, 40), 255.);
        let frame = Frame::new(mat, 0);

        let region = new_region(
            "level_code".to_string(),
            960,
            540,
            300,
            60,
            StreamResolution::HD1080p,
        );
        let cropped = frame.extract_roi(&region).unwrap();
        let gray = cropped.to_gray().unwrap();

        assert_eq!(cropped.resolution(), StreamResolution::new(200, 40));
        assert_eq!(*gray.mat.at_2d::<u8>(0, 0).unwrap(), 255);
        assert_eq!(*gray.mat.at_2d::<u8>(39, 199).unwrap(), 255);
    }
}
