use image::{DynamicImage, GrayImage, RgbaImage};

use crate::error::GazeError;
use crate::geometry::Rect;

/// One captured video frame, converted to grayscale.
///
/// Lives for a single classification tick.
#[derive(Debug, Clone)]
pub struct Frame {
    gray: GrayImage,
}

impl Frame {
    /// Wrap a row-major grayscale buffer of `width` × `height` bytes.
    pub fn from_gray(width: u32, height: u32, data: Vec<u8>) -> Result<Self, GazeError> {
        let expected = buffer_len(width, height, 1)?;
        if data.len() != expected {
            return Err(GazeError::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        let gray = GrayImage::from_raw(width, height, data).ok_or(GazeError::FrameSize {
            expected,
            actual: 0,
        })?;
        Ok(Self { gray })
    }

    /// Convert an RGBA capture buffer (canvas `ImageData` layout) to grayscale.
    pub fn from_rgba(width: u32, height: u32, data: &[u8]) -> Result<Self, GazeError> {
        let expected = buffer_len(width, height, 4)?;
        if data.len() != expected {
            return Err(GazeError::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        let rgba = RgbaImage::from_raw(width, height, data.to_vec()).ok_or(
            GazeError::FrameSize {
                expected,
                actual: data.len(),
            },
        )?;
        Ok(Self {
            gray: DynamicImage::ImageRgba8(rgba).to_luma8(),
        })
    }

    /// Convert a decoded image of any colour type.
    pub fn from_image(image: &DynamicImage) -> Result<Self, GazeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(GazeError::ZeroDimensions);
        }
        Ok(Self {
            gray: image.to_luma8(),
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    /// Grayscale pixels.
    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Copy out the part of the frame covered by `region`, clamped to the frame edges.
    ///
    /// Returns the clamped rectangle alongside the pixels so callers can map
    /// region-local coordinates back into the frame.
    pub fn crop(&self, region: &Rect) -> Result<(Rect, GrayImage), GazeError> {
        let clamped = region
            .clamp_to(self.width(), self.height())
            .ok_or(GazeError::EmptyRegion(*region))?;
        let pixels = image::imageops::crop_imm(
            &self.gray,
            clamped.x as u32,
            clamped.y as u32,
            clamped.width,
            clamped.height,
        )
        .to_image();
        Ok((clamped, pixels))
    }
}

fn buffer_len(width: u32, height: u32, channels: usize) -> Result<usize, GazeError> {
    if width == 0 || height == 0 {
        return Err(GazeError::ZeroDimensions);
    }
    Ok(width as usize * height as usize * channels)
}
