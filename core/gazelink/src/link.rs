//! Connection lifecycle of the single outbound BLE link.
//!
//! The session is a plain state machine: user intent and transport
//! callbacks arrive as method calls, and nothing here blocks. Hosts with a
//! synchronous transport can use [`LinkSession::connect_with`] to run the
//! whole connect sequence in one go.

use std::fmt;

use tracing::{info, warn};

use crate::error::LinkError;

/// 16-bit GATT service the receiver exposes.
pub const SERVICE_UUID: u16 = 0xFFE0;

/// 16-bit characteristic that direction payloads are written to.
pub const CHARACTERISTIC_UUID: u16 = 0xFFE1;

/// Where the session is in its connect lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkState {
    /// No link and no attempt in progress.
    #[default]
    Disconnected,
    /// Waiting for the user to pick a device.
    Requesting,
    /// Device chosen; GATT connect and service lookup in flight.
    Connecting,
    /// Characteristic resolved; writes go out.
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Requesting => "requesting",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Which devices the picker should offer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct DeviceFilter {
    /// Only devices whose advertised name starts with this are accepted.
    pub name_prefix: Option<String>,
    /// GATT service to look up.
    pub service: u16,
    /// Characteristic within `service` to write to.
    pub characteristic: u16,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            name_prefix: None,
            service: SERVICE_UUID,
            characteristic: CHARACTERISTIC_UUID,
        }
    }
}

impl DeviceFilter {
    /// Whether a device called `name` passes the name prefix.
    pub fn accepts(&self, name: &str) -> bool {
        self.name_prefix
            .as_deref()
            .map_or(true, |prefix| name.starts_with(prefix))
    }
}

/// Writable GATT characteristic handle.
pub trait Characteristic {
    /// Write one payload.
    fn write(&self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Blocking view of a wireless transport, one step per connect phase.
pub trait Transport {
    /// Ask the user to pick a device. Returns its display name.
    fn request_device(&mut self, filter: &DeviceFilter) -> Result<String, LinkError>;

    /// Open a GATT connection to `device`.
    fn connect(&mut self, device: &str) -> Result<(), LinkError>;

    /// Resolve `service` and `characteristic` on the connected device.
    fn characteristic(
        &mut self,
        service: u16,
        characteristic: u16,
    ) -> Result<Box<dyn Characteristic>, LinkError>;

    /// Drop the GATT connection, if any.
    fn disconnect(&mut self);
}

/// What happened to a send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the characteristic.
    Sent,
    /// The link was not connected; nothing was attempted.
    Skipped,
    /// The write failed; the link stays up.
    Failed(LinkError),
}

/// State machine owning the link lifecycle and the characteristic handle.
pub struct LinkSession {
    filter: DeviceFilter,
    state: LinkState,
    device: Option<String>,
    characteristic: Option<Box<dyn Characteristic>>,
    last_error: Option<LinkError>,
}

impl fmt::Debug for LinkSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSession")
            .field("state", &self.state)
            .field("device", &self.device)
            .field("has_characteristic", &self.characteristic.is_some())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl Default for LinkSession {
    fn default() -> Self {
        Self::new(DeviceFilter::default())
    }
}

impl LinkSession {
    /// Disconnected session using `filter` for the next connect.
    pub fn new(filter: DeviceFilter) -> Self {
        Self {
            filter,
            state: LinkState::Disconnected,
            device: None,
            characteristic: None,
            last_error: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Filter passed to the device picker.
    pub fn filter(&self) -> &DeviceFilter {
        &self.filter
    }

    /// Name of the chosen device while connecting or connected.
    pub fn device_name(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Reason the most recent connect attempt failed, cleared on the next attempt.
    pub fn last_error(&self) -> Option<&LinkError> {
        self.last_error.as_ref()
    }

    /// Whether a writable handle is held.
    pub fn has_characteristic(&self) -> bool {
        self.characteristic.is_some()
    }

    /// User asked to connect. Only honoured from `Disconnected`.
    pub fn begin_request(&mut self) -> bool {
        if self.state != LinkState::Disconnected {
            return false;
        }
        self.last_error = None;
        self.transition(LinkState::Requesting);
        true
    }

    /// The device picker finished. A name outside the filter prefix fails
    /// the attempt.
    pub fn device_chosen(&mut self, result: Result<String, LinkError>) -> LinkState {
        if self.state != LinkState::Requesting {
            return self.state;
        }
        match result {
            Ok(name) if self.filter.accepts(&name) => {
                self.device = Some(name);
                self.transition(LinkState::Connecting);
            }
            Ok(name) => self.fail(LinkError::DeviceRejected(name)),
            Err(err) => self.fail(err),
        }
        self.state
    }

    /// GATT connect and characteristic lookup finished.
    pub fn gatt_resolved(
        &mut self,
        result: Result<Box<dyn Characteristic>, LinkError>,
    ) -> LinkState {
        if self.state != LinkState::Connecting {
            return self.state;
        }
        match result {
            Ok(characteristic) => {
                self.characteristic = Some(characteristic);
                self.transition(LinkState::Connected);
            }
            Err(err) => self.fail(err),
        }
        self.state
    }

    /// Run the full connect sequence against a blocking transport.
    pub fn connect_with(&mut self, transport: &mut dyn Transport) -> Result<(), LinkError> {
        if !self.begin_request() {
            return Ok(());
        }

        let chosen = transport.request_device(&self.filter);
        if let LinkState::Disconnected = self.device_chosen(chosen) {
            return Err(self.failure());
        }

        let device = self.device.clone().unwrap_or_default();
        let resolved = transport.connect(&device).and_then(|()| {
            transport.characteristic(self.filter.service, self.filter.characteristic)
        });
        if resolved.is_err() {
            transport.disconnect();
        }
        match self.gatt_resolved(resolved) {
            LinkState::Connected => Ok(()),
            _ => Err(self.failure()),
        }
    }

    /// User asked to disconnect. Returns `true` if a live link was closed.
    pub fn close(&mut self) -> bool {
        if self.state != LinkState::Connected {
            return false;
        }
        info!(device = ?self.device, "closing link");
        self.invalidate();
        true
    }

    /// Close through the transport as well as locally.
    pub fn close_with(&mut self, transport: &mut dyn Transport) -> bool {
        if self.state != LinkState::Connected {
            return false;
        }
        transport.disconnect();
        self.close()
    }

    /// The transport reported the link went away.
    ///
    /// Returns `true` if an established link was lost. A drop during
    /// `Connecting` counts as a failed attempt.
    pub fn on_transport_disconnect(&mut self) -> bool {
        match self.state {
            LinkState::Connected => {
                warn!(device = ?self.device, "link dropped by transport");
                self.invalidate();
                true
            }
            LinkState::Connecting => {
                self.fail(LinkError::ConnectFailed("device disconnected".into()));
                false
            }
            LinkState::Disconnected | LinkState::Requesting => false,
        }
    }

    /// Write `bytes` to the characteristic if connected.
    ///
    /// Write failures are logged and reported but leave the state alone;
    /// only a disconnect event tears the link down.
    pub fn send(&self, bytes: &[u8]) -> SendOutcome {
        let (LinkState::Connected, Some(characteristic)) = (self.state, &self.characteristic)
        else {
            return SendOutcome::Skipped;
        };
        match characteristic.write(bytes) {
            Ok(()) => SendOutcome::Sent,
            Err(err) => {
                warn!(error = %err, "characteristic write failed");
                SendOutcome::Failed(err)
            }
        }
    }

    /// Short human-readable status line.
    pub fn status(&self) -> String {
        let device = self.device.as_deref().unwrap_or("device");
        match (self.state, &self.last_error) {
            (LinkState::Disconnected, Some(err)) => format!("Disconnected: {err}"),
            (LinkState::Disconnected, None) => "Disconnected".to_string(),
            (LinkState::Requesting, _) => "Select a device…".to_string(),
            (LinkState::Connecting, _) => format!("Connecting to {device}…"),
            (LinkState::Connected, _) => format!("Connected to {device}"),
        }
    }

    fn fail(&mut self, err: LinkError) {
        warn!(error = %err, state = %self.state, "connect attempt failed");
        self.last_error = Some(err);
        self.invalidate();
    }

    fn failure(&self) -> LinkError {
        self.last_error
            .clone()
            .unwrap_or_else(|| LinkError::ConnectFailed("unknown".into()))
    }

    fn invalidate(&mut self) {
        self.characteristic = None;
        self.device = None;
        self.transition(LinkState::Disconnected);
    }

    fn transition(&mut self, next: LinkState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "link state");
            self.state = next;
        }
    }
}
