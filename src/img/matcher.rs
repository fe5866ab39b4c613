use opencv::{
    core::{absdiff, count_non_zero, extract_channel, min_max_loc, Mat, Point},
    imgproc::{match_template as cv_match_template, threshold, THRESH_BINARY, TM_CCOEFF_NORMED},
    prelude::*,
};

use crate::error::VisionError;
use crate::roi::StreamResolution;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.9;

/// Per-channel difference at which two pixels stop counting as the same.
pub const PIXEL_DIFF_THRESHOLD: f64 = 20.;

/// Top-left corner of the best normalized correlation of `template` over
/// `frame`, or `None` when the best score is under `threshold`.
///
/// Both inputs are expected to be single-channel. Ties go to the first
/// maximum in scan order.
pub fn match_template(
    frame: &Mat,
    template: &Mat,
    threshold: f64,
) -> Result<Option<Point>, VisionError> {
    let mut scores = Mat::default();
    cv_match_template(frame, template, &mut scores, TM_CCOEFF_NORMED, &Mat::default())?;

    let mut best = 0.;
    let mut best_loc = Point::default();
    min_max_loc(
        &scores,
        None,
        Some(&mut best),
        None,
        Some(&mut best_loc),
        &Mat::default(),
    )?;

    // flat templates score NaN
    if !(best >= threshold) {
        return Ok(None);
    }

    Ok(Some(best_loc))
}

/// Fraction of pixels, in [0, 1], that two equally shaped frames share.
///
/// A channel differs when its absolute difference reaches
/// [`PIXEL_DIFF_THRESHOLD`]; differing counts are averaged over channels.
/// Captures are 3-channel color, but any matching channel count is accepted
/// so grayscale frames compare too.
pub fn similarity(first: &Mat, second: &Mat) -> Result<f64, VisionError> {
    let first_res = StreamResolution::new(first.cols(), first.rows());
    let second_res = StreamResolution::new(second.cols(), second.rows());
    let channels = first.channels();

    if first_res != second_res || channels != second.channels() {
        return Err(VisionError::DimensionMismatch {
            left: first_res,
            left_channels: channels,
            right: second_res,
            right_channels: second.channels(),
        });
    }

    let mut diff = Mat::default();
    absdiff(first, second, &mut diff)?;

    let mut differing = 0.;
    for channel in 0..channels {
        let mut plane = Mat::default();
        extract_channel(&diff, &mut plane, channel)?;

        let mut marked = Mat::default();
        threshold(
            &plane,
            &mut marked,
            PIXEL_DIFF_THRESHOLD - 1.,
            255.,
            THRESH_BINARY,
        )?;

        differing += count_non_zero(&marked)? as f64;
    }
    differing /= channels as f64;

    let total = first.rows() as f64 * first.cols() as f64;

    Ok(1. - differing / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::frame::crop;
    use opencv::core::{Rect, Scalar, CV_8UC1, CV_8UC3};
    use opencv::imgproc::rectangle;

    /// Deterministic noise so correlation peaks are unique.
    fn noise(width: i32, height: i32, seed: u32) -> Mat {
        let mut mat =
            Mat::new_rows_cols_with_default(height, width, CV_8UC1, Scalar::all(0.)).unwrap();
        let mut state = seed;
        for row in 0..height {
            for col in 0..width {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                *mat.at_2d_mut::<u8>(row, col).unwrap() = (state >> 16) as u8;
            }
        }
        mat
    }

    fn solid(width: i32, height: i32, value: f64) -> Mat {
        Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(value)).unwrap()
    }

    #[test]
    fn finds_template_at_known_offset() {
        let frame = noise(200, 150, 7);
        let template = crop(&frame, Rect::new(57, 41, 30, 20)).unwrap();

        let found = match_template(&frame, &template, DEFAULT_MATCH_THRESHOLD).unwrap();

        assert_eq!(found, Some(Point::new(57, 41)));
    }

    #[test]
    fn found_region_is_similar_to_template() {
        let frame = noise(120, 90, 11);
        let template = crop(&frame, Rect::new(10, 60, 25, 25)).unwrap();

        let at = match_template(&frame, &template, DEFAULT_MATCH_THRESHOLD)
            .unwrap()
            .expect("template present");
        let region = crop(&frame, Rect::new(at.x, at.y, 25, 25)).unwrap();

        assert!(similarity(&region, &template).unwrap() >= DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn absent_template_is_not_found() {
        let frame = noise(200, 150, 7);
        let template = noise(30, 20, 99);

        assert_eq!(match_template(&frame, &template, 0.9).unwrap(), None);
    }

    #[test]
    fn flat_template_is_not_found() {
        let frame = noise(64, 64, 3);
        let template =
            Mat::new_rows_cols_with_default(8, 8, CV_8UC1, Scalar::all(128.)).unwrap();

        assert_eq!(match_template(&frame, &template, 0.9).unwrap(), None);
    }

    #[test]
    fn self_similarity_is_one() {
        let frame = solid(64, 48, 77.);

        assert_eq!(similarity(&frame, &frame).unwrap(), 1.);
    }

    #[test]
    fn small_differences_are_ignored() {
        let first = solid(40, 40, 100.);
        let second = solid(40, 40, 119.);

        assert_eq!(similarity(&first, &second).unwrap(), 1.);
    }

    #[test]
    fn changed_quarter_scores_three_quarters() {
        let first = solid(40, 40, 100.);
        let mut second = solid(40, 40, 100.);
        rectangle(
            &mut second,
            Rect::new(0, 0, 20, 20),
            Scalar::all(120.),
            -1,
            8,
            0,
        )
        .unwrap();

        assert!((similarity(&first, &second).unwrap() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn differences_average_over_channels() {
        let first = solid(40, 40, 100.);
        let mut second = solid(40, 40, 100.);
        // only blue changes, over half the frame
        rectangle(
            &mut second,
            Rect::new(0, 0, 40, 20),
            Scalar::new(200., 100., 100., 0.),
            -1,
            8,
            0,
        )
        .unwrap();

        let expected = 1. - (800. / 3.) / 1600.;
        assert!((similarity(&first, &second).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn grayscale_frames_compare() {
        let first = Mat::new_rows_cols_with_default(40, 40, CV_8UC1, Scalar::all(10.)).unwrap();
        let mut second = first.clone();
        rectangle(
            &mut second,
            Rect::new(0, 0, 40, 10),
            Scalar::all(250.),
            -1,
            8,
            0,
        )
        .unwrap();

        assert!((similarity(&first, &second).unwrap() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn mismatched_sizes_fail() {
        let first = solid(40, 40, 0.);
        let second = solid(40, 41, 0.);

        assert!(matches!(
            similarity(&first, &second),
            Err(VisionError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn mismatched_channels_fail() {
        let first = solid(40, 40, 0.);
        let second = Mat::new_rows_cols_with_default(40, 40, CV_8UC1, Scalar::all(0.)).unwrap();

        assert!(matches!(
            similarity(&first, &second),
            Err(VisionError::DimensionMismatch { .. })
        ));
    }
}
