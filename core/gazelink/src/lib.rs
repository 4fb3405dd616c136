//! Eye-gaze direction commands: classify video frames as `LEFT`, `RIGHT`,
//! `CENTER` or `BLINK` and forward settled changes over a BLE link.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gazelink::{FeatureDetector, Frame, GazeConfig, GazeLink, Rect};
//!
//! struct MyDetector;
//! impl FeatureDetector for MyDetector {
//!     fn detect_faces(&self, _gray: &[u8], _w: u32, _h: u32) -> Vec<Rect> { vec![] }
//!     fn detect_eyes(&self, _gray: &[u8], _w: u32, _h: u32) -> Vec<Rect> { vec![] }
//! }
//!
//! let mut pipeline = GazeLink::new(MyDetector, GazeConfig::default()).unwrap();
//! let frame = Frame::from_gray(640, 480, vec![0; 640 * 480]).unwrap();
//! let report = pipeline.tick(&frame, Duration::from_millis(16));
//! println!("{} ({})", report.direction, pipeline.status());
//! ```

#![warn(missing_docs)]

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

mod classifier;
mod controller;
mod debounce;
/// Face and eye detection trait.
pub mod detector;
mod error;
mod frame;
mod gaze;
mod geometry;
/// BLE link lifecycle and transport traits.
pub mod link;
mod overlay;
#[cfg(feature = "rustface")]
/// SeetaFace-based detector backend.
pub mod rustface_backend;

pub use classifier::{Classification, DebugGeometry, FrameClassifier};
pub use controller::{Dispatch, GazeLink, TickReport};
pub use debounce::{Debouncer, Payload, PendingSend};
pub use detector::FeatureDetector;
pub use error::{GazeError, LinkError};
pub use frame::Frame;
pub use gaze::{GazeEstimate, GazeEstimator};
pub use geometry::{Point, Rect};
pub use link::{LinkSession, LinkState, SendOutcome};
pub use overlay::draw_overlay;
#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceDetector;

/// Per-frame classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// No face in the frame. Never transmitted.
    NoFace,
    /// A face was found but fewer than two eyes. Never transmitted.
    EyesNotResolved,
    /// The left eye is closed.
    Blink,
    /// Pupil toward the user's left in the mirrored view.
    Left,
    /// Pupil toward the user's right in the mirrored view.
    Right,
    /// Pupil in the centre band, or no usable pupil.
    Center,
}

impl Direction {
    /// Wire label, also used for display.
    pub fn label(self) -> &'static str {
        match self {
            Direction::NoFace => "NO FACE",
            Direction::EyesNotResolved => "NO EYES",
            Direction::Blink => "BLINK",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
            Direction::Center => "CENTER",
        }
    }

    /// Whether this direction may ever be sent to the receiver.
    pub fn is_dispatchable(self) -> bool {
        !matches!(self, Direction::NoFace | Direction::EyesNotResolved)
    }

    /// Swap `Left` and `Right`; everything else is unchanged.
    pub fn mirrored(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            other => other,
        }
    }

    /// Decode a received payload. Only dispatchable labels are accepted.
    pub fn from_payload(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes)
            .ok()?
            .parse::<Direction>()
            .ok()
            .filter(|d| d.is_dispatchable())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Direction {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NO FACE" => Ok(Direction::NoFace),
            "NO EYES" => Ok(Direction::EyesNotResolved),
            "BLINK" => Ok(Direction::Blink),
            "LEFT" => Ok(Direction::Left),
            "RIGHT" => Ok(Direction::Right),
            "CENTER" => Ok(Direction::Center),
            other => Err(GazeError::InvalidConfig(format!(
                "unknown direction: {other}"
            ))),
        }
    }
}

/// Which face to classify when the detector reports several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum FaceSelection {
    /// The first face in detector order.
    #[default]
    First,
    /// The face with the largest area; ties keep detector order.
    Largest,
}

/// Blink threshold on eye height / width.
const DEFAULT_BLINK_RATIO: f32 = 0.3;

/// Intensity at or below which equalised pixels count as pupil.
const DEFAULT_PUPIL_THRESHOLD: u8 = 55;

/// Minimum pupil pixel count for a usable gaze sample.
const DEFAULT_MIN_PUPIL_MASS: u32 = 100;

/// Half-width of the centre band: 0.38 ..= 0.62.
const DEFAULT_GAZE_MARGIN: f32 = 0.12;

const DEFAULT_SETTLE_DELAY_MS: u64 = 120;

/// Tunable thresholds for classification and dispatch.
///
/// Every field has a working default; use the builder-style setters to
/// override individual values, then [`GazeConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct GazeConfig {
    /// Left-eye height / width below which the frame is a blink.
    pub blink_ratio_threshold: f32,
    /// Binarisation threshold applied after histogram equalisation.
    pub pupil_threshold: u8,
    /// Radius of the square structuring element for close/open. 0 disables cleanup.
    pub morph_radius: u8,
    /// Minimum foreground pixels for a gaze sample to count.
    pub min_pupil_mass: u32,
    /// Distance of each lateral threshold from 0.5.
    pub gaze_margin: f32,
    /// The user sees a horizontally flipped view; labels follow that view.
    pub mirrored: bool,
    /// How long a new direction must stay latest before it is sent.
    pub settle_delay_ms: u64,
    /// Which face to classify when several are detected.
    pub face_selection: FaceSelection,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            blink_ratio_threshold: DEFAULT_BLINK_RATIO,
            pupil_threshold: DEFAULT_PUPIL_THRESHOLD,
            morph_radius: 1,
            min_pupil_mass: DEFAULT_MIN_PUPIL_MASS,
            gaze_margin: DEFAULT_GAZE_MARGIN,
            mirrored: true,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            face_selection: FaceSelection::First,
        }
    }
}

impl GazeConfig {
    /// Set the eye height / width ratio below which a blink is reported.
    pub fn blink_ratio_threshold(mut self, ratio: f32) -> Self {
        self.blink_ratio_threshold = ratio;
        self
    }

    /// Set the binarisation threshold for equalised pupil pixels.
    pub fn pupil_threshold(mut self, threshold: u8) -> Self {
        self.pupil_threshold = threshold;
        self
    }

    /// Set the morphology radius. `0` skips close/open.
    pub fn morph_radius(mut self, radius: u8) -> Self {
        self.morph_radius = radius;
        self
    }

    /// Set the minimum pupil pixel count.
    pub fn min_pupil_mass(mut self, mass: u32) -> Self {
        self.min_pupil_mass = mass;
        self
    }

    /// Set the centre band half-width. `0.12` gives thresholds 0.38 and 0.62.
    pub fn gaze_margin(mut self, margin: f32) -> Self {
        self.gaze_margin = margin;
        self
    }

    /// Label directions in the flipped (mirror) view or the raw camera view.
    pub fn mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    /// Set the settle delay in milliseconds.
    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    /// Set the face selection policy.
    pub fn face_selection(mut self, policy: FaceSelection) -> Self {
        self.face_selection = policy;
        self
    }

    /// Settle delay as a [`Duration`].
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Lower and upper gaze ratio thresholds, symmetric around 0.5.
    pub fn gaze_bands(&self) -> (f32, f32) {
        (0.5 - self.gaze_margin, 0.5 + self.gaze_margin)
    }

    /// Check that thresholds are in range.
    pub fn validate(&self) -> Result<(), GazeError> {
        if !(self.blink_ratio_threshold > 0.0 && self.blink_ratio_threshold < 1.0) {
            return Err(GazeError::InvalidConfig(format!(
                "blink ratio threshold must be in (0, 1), got {}",
                self.blink_ratio_threshold
            )));
        }
        if !(self.gaze_margin > 0.0 && self.gaze_margin < 0.5) {
            return Err(GazeError::InvalidConfig(format!(
                "gaze margin must be in (0, 0.5), got {}",
                self.gaze_margin
            )));
        }
        Ok(())
    }
}
