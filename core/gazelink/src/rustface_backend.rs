use std::io::Read;
use std::path::Path;

use crate::detector::FeatureDetector;
use crate::error::GazeError;
use crate::geometry::Rect;

/// Eye box size as a fraction of the face box.
const EYE_WIDTH_RATIO: f32 = 0.25;
const EYE_HEIGHT_RATIO: f32 = 0.15;

/// Eye centres as fractions of the face box.
const EYE_CENTER_Y: f32 = 0.38;
const LEFT_EYE_CENTER_X: f32 = 0.30;
const RIGHT_EYE_CENTER_X: f32 = 0.70;

/// Detector backed by the `rustface` crate (SeetaFace engine).
///
/// SeetaFace only finds faces. Eye boxes are proposed from typical frontal
/// face proportions, which is enough for gaze estimation but never reports
/// a blink; pair it with a real eye detector if blinks matter.
pub struct RustfaceDetector {
    model: rustface::Model,
    min_face_size: u32,
}

impl RustfaceDetector {
    /// Load a SeetaFace model file, e.g. `seeta_fd_frontal_v1.0.bin`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GazeError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| GazeError::DetectorInit(format!("{}: {e}", path.display())))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Load a SeetaFace model from any reader.
    pub fn from_reader(reader: impl Read) -> Result<Self, GazeError> {
        let model =
            rustface::read_model(reader).map_err(|e| GazeError::DetectorInit(e.to_string()))?;
        Ok(Self {
            model,
            min_face_size: 40,
        })
    }

    /// Smallest face side in pixels the detector will search for (default: 40).
    pub fn min_face_size(mut self, size: u32) -> Self {
        self.min_face_size = size;
        self
    }
}

impl FeatureDetector for RustfaceDetector {
    fn detect_faces(&self, gray: &[u8], width: u32, height: u32) -> Vec<Rect> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.min_face_size);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(gray, width, height));

        faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                Rect::new(bbox.x(), bbox.y(), bbox.width(), bbox.height())
            })
            .collect()
    }

    fn detect_eyes(&self, _gray: &[u8], width: u32, height: u32) -> Vec<Rect> {
        eye_proposals(width, height)
    }
}

/// Left and right eye boxes for a face crop of `width` × `height`.
fn eye_proposals(width: u32, height: u32) -> Vec<Rect> {
    let eye_w = (width as f32 * EYE_WIDTH_RATIO).round() as u32;
    let eye_h = (height as f32 * EYE_HEIGHT_RATIO).round() as u32;
    let y = (height as f32 * EYE_CENTER_Y - eye_h as f32 / 2.0).round() as i32;

    [LEFT_EYE_CENTER_X, RIGHT_EYE_CENTER_X]
        .iter()
        .filter_map(|cx| {
            let x = (width as f32 * cx - eye_w as f32 / 2.0).round() as i32;
            Rect::new(x, y, eye_w, eye_h)
        })
        .collect()
}
