use std::time::Duration;

use gazelink::link::{Characteristic, DeviceFilter, CHARACTERISTIC_UUID, SERVICE_UUID};
use gazelink::{Direction, FeatureDetector, Frame, GazeConfig, LinkError, Rect, SendOutcome};
use js_sys::{Function, Uint8Array};
use serde::Deserialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// Rectangle as returned by a JS detector callback.
#[derive(Deserialize)]
struct JsRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Detector that calls back into JS, e.g. OpenCV.js cascade classifiers.
///
/// Each callback receives `(gray: Uint8Array, width, height)` and returns an
/// array of `{x, y, width, height}`. A throwing callback or malformed result
/// counts as "nothing found".
struct JsDetector {
    detect_faces: Function,
    detect_eyes: Function,
}

impl JsDetector {
    fn call(callback: &Function, gray: &[u8], width: u32, height: u32) -> Vec<Rect> {
        let result = callback.call3(
            &JsValue::NULL,
            &Uint8Array::from(gray),
            &JsValue::from(width),
            &JsValue::from(height),
        );
        let Ok(value) = result else {
            return Vec::new();
        };
        serde_wasm_bindgen::from_value::<Vec<JsRect>>(value)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                Rect::new(
                    r.x.round() as i32,
                    r.y.round() as i32,
                    r.width.round().max(0.0) as u32,
                    r.height.round().max(0.0) as u32,
                )
            })
            .collect()
    }
}

impl FeatureDetector for JsDetector {
    fn detect_faces(&self, gray: &[u8], width: u32, height: u32) -> Vec<Rect> {
        Self::call(&self.detect_faces, gray, width, height)
    }

    fn detect_eyes(&self, gray: &[u8], width: u32, height: u32) -> Vec<Rect> {
        Self::call(&self.detect_eyes, gray, width, height)
    }
}

/// Characteristic write forwarded to a JS function taking a `Uint8Array`.
///
/// Only synchronous throws are seen here; a rejected `writeValue` promise
/// has to be handled on the JS side.
struct JsCharacteristic {
    write: Function,
}

impl Characteristic for JsCharacteristic {
    fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        self.write
            .call1(&JsValue::NULL, &Uint8Array::from(bytes))
            .map(|_| ())
            .map_err(|e| LinkError::WriteFailed(describe(&e)))
    }
}

fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

/// Create a JS `Error` with a `code` property.
fn make_error(code: &str, message: &str) -> JsValue {
    let err = js_sys::Error::new(message);
    let _ = js_sys::Reflect::set(&err, &"code".into(), &JsValue::from_str(code));
    JsValue::from(err)
}

/// Convert a `GazeError` into a JS `Error` with a machine-readable `code` property.
fn to_js_error(e: gazelink::GazeError) -> JsValue {
    let code = match &e {
        gazelink::GazeError::InvalidConfig(_) => "INVALID_OPTIONS",
        gazelink::GazeError::FrameSize { .. } => "FRAME_SIZE",
        gazelink::GazeError::ZeroDimensions => "ZERO_DIMENSIONS",
        gazelink::GazeError::EmptyRegion(_) => "EMPTY_REGION",
        gazelink::GazeError::DetectorInit(_) => "DETECTOR_INIT",
        gazelink::GazeError::Link(_) => "LINK_ERROR",
    };
    make_error(code, &e.to_string())
}

/// Read classification settings and the device filter from one options object.
fn parse_options(options: JsValue) -> Result<(GazeConfig, DeviceFilter), JsValue> {
    if options.is_undefined() || options.is_null() {
        return Ok((GazeConfig::default(), DeviceFilter::default()));
    }
    let invalid = |e: serde_wasm_bindgen::Error| {
        make_error("INVALID_OPTIONS", &format!("invalid options: {e}"))
    };
    let config = serde_wasm_bindgen::from_value(options.clone()).map_err(invalid)?;
    let filter = serde_wasm_bindgen::from_value(options).map_err(invalid)?;
    Ok((config, filter))
}

fn millis(now_ms: f64) -> Duration {
    Duration::try_from_secs_f64(now_ms / 1000.0).unwrap_or_default()
}

fn rect_object(rect: &Rect) -> Result<JsValue, JsValue> {
    let obj = js_sys::Object::new();
    js_sys::Reflect::set(&obj, &"x".into(), &JsValue::from(rect.x))?;
    js_sys::Reflect::set(&obj, &"y".into(), &JsValue::from(rect.y))?;
    js_sys::Reflect::set(&obj, &"width".into(), &JsValue::from(rect.width))?;
    js_sys::Reflect::set(&obj, &"height".into(), &JsValue::from(rect.height))?;
    Ok(JsValue::from(obj))
}

fn outcome_to_str(outcome: &SendOutcome) -> &'static str {
    match outcome {
        SendOutcome::Sent => "sent",
        SendOutcome::Skipped => "skipped",
        SendOutcome::Failed(_) => "failed",
    }
}

/// Build a plain JS object describing one dispatch, or `null`.
fn dispatch_object(dispatch: Option<&gazelink::Dispatch>) -> Result<JsValue, JsValue> {
    let Some(dispatch) = dispatch else {
        return Ok(JsValue::NULL);
    };
    let obj = js_sys::Object::new();
    js_sys::Reflect::set(
        &obj,
        &"direction".into(),
        &JsValue::from_str(dispatch.payload.direction().label()),
    )?;
    js_sys::Reflect::set(
        &obj,
        &"outcome".into(),
        &JsValue::from_str(outcome_to_str(&dispatch.outcome)),
    )?;
    Ok(JsValue::from(obj))
}

/// Build a plain JS object from a `TickReport`.
fn report_object(report: &gazelink::TickReport) -> Result<JsValue, JsValue> {
    let obj = js_sys::Object::new();
    js_sys::Reflect::set(
        &obj,
        &"direction".into(),
        &JsValue::from_str(report.direction.label()),
    )?;

    let face = match report.geometry.face.as_ref() {
        Some(face) => rect_object(face)?,
        None => JsValue::NULL,
    };
    js_sys::Reflect::set(&obj, &"face".into(), &face)?;

    let eyes = js_sys::Array::new();
    for eye in &report.geometry.eyes {
        eyes.push(&rect_object(eye)?);
    }
    js_sys::Reflect::set(&obj, &"eyes".into(), &eyes)?;

    let centroid = match report.geometry.centroid {
        Some(c) => {
            let point = js_sys::Object::new();
            js_sys::Reflect::set(&point, &"x".into(), &JsValue::from(c.x))?;
            js_sys::Reflect::set(&point, &"y".into(), &JsValue::from(c.y))?;
            JsValue::from(point)
        }
        None => JsValue::NULL,
    };
    js_sys::Reflect::set(&obj, &"centroid".into(), &centroid)?;
    js_sys::Reflect::set(
        &obj,
        &"dispatch".into(),
        &dispatch_object(report.dispatch.as_ref())?,
    )?;

    Ok(JsValue::from(obj))
}

/// GATT service identifier the receiver must expose.
#[wasm_bindgen(js_name = "serviceUuid")]
pub fn service_uuid() -> u16 {
    SERVICE_UUID
}

/// GATT characteristic identifier direction payloads are written to.
#[wasm_bindgen(js_name = "characteristicUuid")]
pub fn characteristic_uuid() -> u16 {
    CHARACTERISTIC_UUID
}

/// Gaze classification pipeline with its BLE link state, driven from JS.
///
/// Call `tick` once per animation frame. Forward Web Bluetooth progress
/// through `requestStarted`, `deviceChosen`, `characteristicReady`,
/// `connectFailed` and `transportDisconnected`.
#[wasm_bindgen(js_name = "GazeLink")]
pub struct WasmGazeLink {
    inner: gazelink::GazeLink<JsDetector>,
}

#[wasm_bindgen(js_class = "GazeLink")]
impl WasmGazeLink {
    /// @param detectFaces - `(gray, width, height) => Rect[]` over the whole frame
    /// @param detectEyes - `(gray, width, height) => Rect[]` over a face crop
    /// @param options - Optional object with fields: blinkRatioThreshold,
    ///   pupilThreshold, morphRadius, minPupilMass, gazeMargin, mirrored,
    ///   settleDelayMs, faceSelection ("first" | "largest"), namePrefix,
    ///   service, characteristic
    #[wasm_bindgen(constructor)]
    pub fn new(
        detect_faces: Function,
        detect_eyes: Function,
        options: JsValue,
    ) -> Result<WasmGazeLink, JsValue> {
        let (config, filter) = parse_options(options)?;
        let detector = JsDetector {
            detect_faces,
            detect_eyes,
        };
        let inner = gazelink::GazeLink::new(detector, config)
            .map_err(to_js_error)?
            .device_filter(filter);
        Ok(Self { inner })
    }

    /// Classify one RGBA frame (canvas `ImageData.data`) captured at `nowMs`.
    pub fn tick(
        &mut self,
        rgba: &[u8],
        width: u32,
        height: u32,
        now_ms: f64,
    ) -> Result<JsValue, JsValue> {
        let frame = Frame::from_rgba(width, height, rgba).map_err(to_js_error)?;
        let report = self.inner.tick(&frame, millis(now_ms));
        report_object(&report)
    }

    /// Fire a due settle action between frames. Returns the dispatch or `null`.
    pub fn poll(&mut self, now_ms: f64) -> Result<JsValue, JsValue> {
        let dispatch = self.inner.poll(millis(now_ms));
        dispatch_object(dispatch.as_ref())
    }

    /// User clicked connect. Returns `false` if a connection is already underway.
    #[wasm_bindgen(js_name = "requestStarted")]
    pub fn request_started(&mut self) -> bool {
        self.inner.begin_request()
    }

    /// The picker returned a device. Names outside `namePrefix` are rejected.
    #[wasm_bindgen(js_name = "deviceChosen")]
    pub fn device_chosen(&mut self, name: String) -> String {
        self.inner.device_chosen(Ok(name)).to_string()
    }

    /// The GATT characteristic was resolved; `write` sends a `Uint8Array`.
    #[wasm_bindgen(js_name = "characteristicReady")]
    pub fn characteristic_ready(&mut self, write: Function) -> String {
        let handle: Box<dyn Characteristic> = Box::new(JsCharacteristic { write });
        self.inner.gatt_resolved(Ok(handle)).to_string()
    }

    /// A connect step failed.
    ///
    /// @param stage - "request", "connect", "service" or "characteristic"
    #[wasm_bindgen(js_name = "connectFailed")]
    pub fn connect_failed(&mut self, stage: &str, reason: String) -> String {
        let err = match stage {
            "request" => LinkError::NoDeviceChosen,
            "service" => LinkError::ServiceNotFound(self.inner.link().filter().service),
            "characteristic" => {
                LinkError::CharacteristicNotFound(self.inner.link().filter().characteristic)
            }
            _ => LinkError::ConnectFailed(reason),
        };
        // Fail whichever connect step is in flight
        let state = match self.inner.link().state() {
            gazelink::LinkState::Requesting => self.inner.device_chosen(Err(err)),
            _ => self.inner.gatt_resolved(Err(err)),
        };
        state.to_string()
    }

    /// User clicked disconnect. Returns `true` if a live link was closed.
    pub fn disconnect(&mut self) -> bool {
        self.inner.close()
    }

    /// The `gattserverdisconnected` event fired.
    #[wasm_bindgen(js_name = "transportDisconnected")]
    pub fn transport_disconnected(&mut self) -> bool {
        self.inner.on_transport_disconnect()
    }

    /// One of "disconnected", "requesting", "connecting", "connected".
    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        self.inner.link().state().to_string()
    }

    /// Name prefix to pass to `navigator.bluetooth.requestDevice`, or `undefined`.
    #[wasm_bindgen(getter, js_name = "namePrefix")]
    pub fn name_prefix(&self) -> Option<String> {
        self.inner.link().filter().name_prefix.clone()
    }

    /// GATT service to request, as a 16-bit UUID.
    #[wasm_bindgen(getter, js_name = "serviceUuid")]
    pub fn service(&self) -> u16 {
        self.inner.link().filter().service
    }

    /// Status line for display.
    #[wasm_bindgen(getter)]
    pub fn status(&self) -> String {
        self.inner.status()
    }

    /// Label of the last committed direction, or `undefined`.
    #[wasm_bindgen(getter, js_name = "lastSent")]
    pub fn last_sent(&self) -> Option<String> {
        self.inner
            .debouncer()
            .last_sent()
            .map(|d: Direction| d.label().to_string())
    }
}
