use std::time::Duration;

use tracing::{info, warn};

use crate::classifier::{Classification, DebugGeometry, FrameClassifier};
use crate::debounce::{Debouncer, Payload};
use crate::detector::FeatureDetector;
use crate::error::{GazeError, LinkError};
use crate::frame::Frame;
use crate::geometry::Rect;
use crate::link::{
    Characteristic, DeviceFilter, LinkSession, LinkState, SendOutcome, Transport,
};
use crate::{Direction, GazeConfig};

/// A committed direction change and what the link did with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// The committed direction.
    pub payload: Payload,
    /// `Skipped` when the link was not connected.
    pub outcome: SendOutcome,
}

/// Everything one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// This frame's classification.
    pub direction: Direction,
    /// Boxes and centroid for the overlay.
    pub geometry: DebugGeometry,
    /// Set on the tick a settled change fired.
    pub dispatch: Option<Dispatch>,
}

/// The tick loop: classify each frame, debounce the result, and forward
/// settled changes over the link.
///
/// Single-threaded by construction. Link callbacks go through this type so
/// the debounce state is reset whenever the link comes up or goes down.
#[derive(Debug)]
pub struct GazeLink<D> {
    detector: D,
    classifier: FrameClassifier,
    debouncer: Debouncer,
    link: LinkSession,
}

impl<D: FeatureDetector> GazeLink<D> {
    /// Build the pipeline. Fails only on an invalid configuration.
    pub fn new(detector: D, config: GazeConfig) -> Result<Self, GazeError> {
        config.validate()?;
        Ok(Self {
            detector,
            classifier: FrameClassifier::new(&config),
            debouncer: Debouncer::new(config.settle_delay()),
            link: LinkSession::default(),
        })
    }

    /// Replace the device filter used for the next connect.
    pub fn device_filter(mut self, filter: DeviceFilter) -> Self {
        self.link = LinkSession::new(filter);
        self
    }

    /// The BLE session.
    pub fn link(&self) -> &LinkSession {
        &self.link
    }

    /// The debounce state.
    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Run face detection on `frame`, then classify and dispatch.
    pub fn tick(&mut self, frame: &Frame, now: Duration) -> TickReport {
        let gray = frame.gray();
        let faces = self
            .detector
            .detect_faces(gray.as_raw(), gray.width(), gray.height());
        self.tick_with_faces(frame, &faces, now)
    }

    /// Classify and dispatch using face boxes found elsewhere.
    ///
    /// A classification error costs only this tick: it is logged and the
    /// tick reports `NoFace`.
    pub fn tick_with_faces(
        &mut self,
        frame: &Frame,
        faces: &[Rect],
        now: Duration,
    ) -> TickReport {
        let Classification {
            direction,
            geometry,
        } = self
            .classifier
            .classify(frame, faces, &self.detector)
            .unwrap_or_else(|err| {
                warn!(error = %err, "frame classification failed");
                Classification {
                    direction: Direction::NoFace,
                    geometry: DebugGeometry::default(),
                }
            });

        let dispatch = self
            .debouncer
            .on_direction(direction, now)
            .map(|payload| self.dispatch(payload));

        TickReport {
            direction,
            geometry,
            dispatch,
        }
    }

    /// Fire a due settle action between frames.
    pub fn poll(&mut self, now: Duration) -> Option<Dispatch> {
        self.debouncer
            .poll(now)
            .map(|payload| self.dispatch(payload))
    }

    /// User asked to connect.
    pub fn begin_request(&mut self) -> bool {
        self.link.begin_request()
    }

    /// The device picker finished.
    pub fn device_chosen(&mut self, result: Result<String, LinkError>) -> LinkState {
        self.link.device_chosen(result)
    }

    /// GATT lookup finished. Entering `Connected` clears the debounce state.
    pub fn gatt_resolved(
        &mut self,
        result: Result<Box<dyn Characteristic>, LinkError>,
    ) -> LinkState {
        let state = self.link.gatt_resolved(result);
        if state == LinkState::Connected {
            self.debouncer.reset();
        }
        state
    }

    /// Connect through a blocking transport.
    pub fn connect_with(&mut self, transport: &mut dyn Transport) -> Result<(), LinkError> {
        let was_connected = self.link.state() == LinkState::Connected;
        self.link.connect_with(transport)?;
        if !was_connected && self.link.state() == LinkState::Connected {
            self.debouncer.reset();
        }
        Ok(())
    }

    /// User-initiated disconnect.
    pub fn close(&mut self) -> bool {
        let closed = self.link.close();
        if closed {
            self.debouncer.reset();
        }
        closed
    }

    /// User-initiated disconnect through the transport.
    pub fn close_with(&mut self, transport: &mut dyn Transport) -> bool {
        let closed = self.link.close_with(transport);
        if closed {
            self.debouncer.reset();
        }
        closed
    }

    /// Transport reported the link dropped.
    pub fn on_transport_disconnect(&mut self) -> bool {
        let dropped = self.link.on_transport_disconnect();
        if dropped {
            self.debouncer.reset();
        }
        dropped
    }

    /// Short status line for display.
    pub fn status(&self) -> String {
        match self.debouncer.last_sent() {
            Some(direction) => format!("{} · last sent {direction}", self.link.status()),
            None => self.link.status(),
        }
    }

    fn dispatch(&mut self, payload: Payload) -> Dispatch {
        let outcome = self.link.send(payload.as_bytes());
        if outcome == SendOutcome::Sent {
            info!(direction = %payload.direction(), "direction sent");
        }
        Dispatch { payload, outcome }
    }
}
