//! Pupil localisation and horizontal gaze classification for a single eye crop.

use image::GrayImage;
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use imageproc::stats::cumulative_histogram;
use tracing::debug;

use crate::geometry::Point;
use crate::{Direction, GazeConfig};

/// Outcome of [`GazeEstimator::estimate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeEstimate {
    /// `Left`, `Right` or `Center`.
    pub direction: Direction,
    /// Normalised horizontal pupil position in `[0, 1]`, if the pupil was found.
    pub ratio: Option<f32>,
    /// Pupil centroid in eye-crop coordinates.
    pub centroid: Option<Point>,
}

impl GazeEstimate {
    fn rejected() -> Self {
        Self {
            direction: Direction::Center,
            ratio: None,
            centroid: None,
        }
    }
}

/// Foreground centroid of one eye crop; never outlives the estimate.
struct GazeSample {
    centroid_x: f32,
    centroid_y: f32,
    eye_width: u32,
}

impl GazeSample {
    fn ratio(&self) -> f32 {
        (self.centroid_x / self.eye_width as f32).clamp(0.0, 1.0)
    }
}

/// Maps an eye crop to `Left`, `Right` or `Center` from the pupil position.
#[derive(Debug, Clone)]
pub struct GazeEstimator {
    pupil_threshold: u8,
    morph_radius: u8,
    min_mass: u32,
    low: f32,
    high: f32,
    mirrored: bool,
}

impl GazeEstimator {
    /// Estimator with the pupil and band settings from `config`.
    pub fn new(config: &GazeConfig) -> Self {
        let (low, high) = config.gaze_bands();
        Self {
            pupil_threshold: config.pupil_threshold,
            morph_radius: config.morph_radius,
            min_mass: config.min_pupil_mass,
            low,
            high,
            mirrored: config.mirrored,
        }
    }

    /// Classify the gaze direction of a grayscale eye crop.
    ///
    /// Returns `Center` with no ratio when too little pupil mass survives
    /// the cleanup, e.g. a half-closed eye or a box that drifted onto skin.
    pub fn estimate(&self, eye: &GrayImage) -> GazeEstimate {
        if eye.width() == 0 || eye.height() == 0 {
            return GazeEstimate::rejected();
        }

        let mask = self.pupil_mask(eye);
        let Some(sample) = self.sample(&mask) else {
            return GazeEstimate::rejected();
        };

        let ratio = sample.ratio();
        let direction = self.classify_ratio(ratio);
        debug!(ratio, ?direction, "gaze estimated");

        GazeEstimate {
            direction,
            ratio: Some(ratio),
            centroid: Some(Point {
                x: sample.centroid_x,
                y: sample.centroid_y,
            }),
        }
    }

    /// Equalise, binarise with dark pixels as foreground, then close and open
    /// to fill glints and drop speckle.
    pub fn pupil_mask(&self, eye: &GrayImage) -> GrayImage {
        let equalized = equalize(eye);
        let binary = threshold(
            &equalized,
            self.pupil_threshold,
            ThresholdType::BinaryInverted,
        );
        if self.morph_radius == 0 {
            return binary;
        }
        let closed = close(&binary, Norm::LInf, self.morph_radius);
        open(&closed, Norm::LInf, self.morph_radius)
    }

    /// Map a normalised ratio onto a subject-relative direction.
    pub fn classify_ratio(&self, ratio: f32) -> Direction {
        // Bands are defined on the mirrored (user-facing) view.
        let direction = if ratio < self.low {
            Direction::Left
        } else if ratio > self.high {
            Direction::Right
        } else {
            Direction::Center
        };
        if self.mirrored {
            direction
        } else {
            direction.mirrored()
        }
    }

    /// Zeroth and first order moments of the binary mask, foreground counted as 1.
    fn sample(&self, mask: &GrayImage) -> Option<GazeSample> {
        let mut m00: u64 = 0;
        let mut m10: u64 = 0;
        let mut m01: u64 = 0;
        for (x, y, pixel) in mask.enumerate_pixels() {
            if pixel.0[0] > 0 {
                m00 += 1;
                m10 += x as u64;
                m01 += y as u64;
            }
        }

        if m00 == 0 || m00 < self.min_mass as u64 {
            debug!(mass = m00, min = self.min_mass, "pupil mass below minimum");
            return None;
        }

        Some(GazeSample {
            centroid_x: m10 as f32 / m00 as f32,
            centroid_y: m01 as f32 / m00 as f32,
            eye_width: mask.width(),
        })
    }
}

/// Histogram equalisation that stretches the darkest occupied level to 0 and
/// the brightest to 255, whatever share of the crop each covers.
///
/// A single-level crop is returned unchanged.
fn equalize(eye: &GrayImage) -> GrayImage {
    let cdf = cumulative_histogram(eye).channels[0];
    let total = cdf[255];
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total <= cdf_min {
        return eye.clone();
    }

    let span = (total - cdf_min) as f32;
    let lut: Vec<u8> = cdf
        .iter()
        .map(|&c| (c.saturating_sub(cdf_min) as f32 / span * 255.0).round() as u8)
        .collect();

    let mut out = eye.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = lut[pixel.0[0] as usize];
    }
    out
}
