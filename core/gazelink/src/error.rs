use thiserror::Error;

/// Errors from frame handling, configuration and detector setup.
#[derive(Debug, Error)]
pub enum GazeError {
    /// A threshold is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pixel buffer length does not match the dimensions.
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    FrameSize {
        /// Length implied by width, height and channel count.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// Width or height is zero.
    #[error("frame dimensions are zero")]
    ZeroDimensions,

    /// A face or eye box lies entirely outside the frame.
    #[error("region {0:?} does not intersect the frame")]
    EmptyRegion(crate::Rect),

    /// The detector backend could not be loaded.
    #[error("failed to initialise detector: {0}")]
    DetectorInit(String),

    /// A link operation failed.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Failures raised by the wireless transport.
///
/// Connect-phase variants send the [`crate::LinkSession`] back to
/// `Disconnected`; `WriteFailed` is reported at the send site only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The picker was dismissed.
    #[error("no device was chosen")]
    NoDeviceChosen,

    /// Connecting to the chosen device failed.
    #[error("GATT connect failed: {0}")]
    ConnectFailed(String),

    /// The device lacks the expected service.
    #[error("service {0:#06x} not found")]
    ServiceNotFound(u16),

    /// The service lacks the expected characteristic.
    #[error("characteristic {0:#06x} not found")]
    CharacteristicNotFound(u16),

    /// A payload write was rejected.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The chosen device's name does not match the filter prefix.
    #[error("device {0:?} does not match the name filter")]
    DeviceRejected(String),

    /// The operation needs an established link.
    #[error("link is not connected")]
    NotConnected,
}
