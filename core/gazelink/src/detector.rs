use crate::geometry::Rect;

/// Pluggable face and eye localisation backend.
///
/// Implement this trait to plug in a Haar cascade, an ONNX model, or any
/// other detector and pass it to [`crate::GazeLink::new`]. Results carry no
/// confidence and no ordering guarantee; either method may return nothing.
///
/// Implementations need not be `Send`; the tick loop is single-threaded.
pub trait FeatureDetector {
    /// Detect faces in a row-major grayscale buffer of `width` × `height` bytes.
    fn detect_faces(&self, gray: &[u8], width: u32, height: u32) -> Vec<Rect>;

    /// Detect eyes inside a face crop. Returned rectangles are relative to the crop.
    fn detect_eyes(&self, gray: &[u8], width: u32, height: u32) -> Vec<Rect>;
}

impl<T: FeatureDetector + ?Sized> FeatureDetector for Box<T> {
    fn detect_faces(&self, gray: &[u8], width: u32, height: u32) -> Vec<Rect> {
        (**self).detect_faces(gray, width, height)
    }

    fn detect_eyes(&self, gray: &[u8], width: u32, height: u32) -> Vec<Rect> {
        (**self).detect_eyes(gray, width, height)
    }
}
