use tracing::debug;

use crate::detector::FeatureDetector;
use crate::error::GazeError;
use crate::frame::Frame;
use crate::gaze::GazeEstimator;
use crate::geometry::{Point, Rect};
use crate::{Direction, FaceSelection, GazeConfig};

/// Shapes to draw over the frame for one tick, in frame coordinates.
///
/// Purely observational; nothing here feeds back into classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugGeometry {
    /// The face that was classified.
    pub face: Option<Rect>,
    /// The operative eye pair, screen-left first. Empty unless both resolved.
    pub eyes: Vec<Rect>,
    /// Pupil centroid of the screen-left eye, when gaze estimation found one.
    pub centroid: Option<Point>,
}

/// Result of classifying one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The frame's direction.
    pub direction: Direction,
    /// What was found along the way.
    pub geometry: DebugGeometry,
}

/// Turns a frame plus detector output into a single [`Direction`].
///
/// Stateless between frames: every call starts from scratch.
#[derive(Debug, Clone)]
pub struct FrameClassifier {
    blink_ratio_threshold: f32,
    face_selection: FaceSelection,
    gaze: GazeEstimator,
}

impl FrameClassifier {
    /// Classifier with the thresholds and face policy from `config`.
    pub fn new(config: &GazeConfig) -> Self {
        Self {
            blink_ratio_threshold: config.blink_ratio_threshold,
            face_selection: config.face_selection,
            gaze: GazeEstimator::new(config),
        }
    }

    /// Pick the face to classify according to the configured policy.
    pub fn select_face(&self, faces: &[Rect]) -> Option<Rect> {
        match self.face_selection {
            FaceSelection::First => faces.first().copied(),
            // max_by_key returns the last maximum; reverse so ties keep detector order
            FaceSelection::Largest => faces.iter().rev().max_by_key(|f| f.area()).copied(),
        }
    }

    /// Classify `frame` given the faces found in it.
    ///
    /// Errors only for geometry the frame cannot satisfy (a face box entirely
    /// outside the frame); callers treat that as a lost tick.
    pub fn classify(
        &self,
        frame: &Frame,
        faces: &[Rect],
        detector: &dyn FeatureDetector,
    ) -> Result<Classification, GazeError> {
        let Some(face) = self.select_face(faces) else {
            return Ok(Classification {
                direction: Direction::NoFace,
                geometry: DebugGeometry::default(),
            });
        };

        let (face, face_pixels) = frame.crop(&face)?;
        let mut geometry = DebugGeometry {
            face: Some(face),
            ..DebugGeometry::default()
        };

        let mut candidates: Vec<Rect> = detector
            .detect_eyes(face_pixels.as_raw(), face_pixels.width(), face_pixels.height())
            .into_iter()
            .map(|eye| eye.translate(face.x, face.y))
            .collect();

        if candidates.len() < 2 {
            debug!(found = candidates.len(), "eyes not resolved");
            return Ok(Classification {
                direction: Direction::EyesNotResolved,
                geometry,
            });
        }

        candidates.sort_by_key(|eye| eye.x);
        let left_eye = candidates[0];
        let right_eye = candidates[1];
        geometry.eyes = vec![left_eye, right_eye];

        let aspect = left_eye.aspect_ratio();
        if aspect < self.blink_ratio_threshold {
            debug!(aspect, "blink");
            return Ok(Classification {
                direction: Direction::Blink,
                geometry,
            });
        }

        let (eye_region, eye_pixels) = frame.crop(&left_eye)?;
        let estimate = self.gaze.estimate(&eye_pixels);
        geometry.centroid = estimate.centroid.map(|c| Point {
            x: eye_region.x as f32 + c.x,
            y: eye_region.y as f32 + c.y,
        });

        Ok(Classification {
            direction: estimate.direction,
            geometry,
        })
    }
}
