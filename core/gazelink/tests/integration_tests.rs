use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use gazelink::link::{Characteristic, DeviceFilter, Transport};
use gazelink::{
    Direction, FeatureDetector, Frame, GazeConfig, GazeLink, LinkError, LinkState, Rect,
    SendOutcome,
};

const FRAME_W: u32 = 200;
const FRAME_H: u32 = 120;
const SKIN: u8 = 200;
const PUPIL: u8 = 20;

/// Pupil widths on the 30 × 20 eye, from 112 px (19% of the crop) to 196 px (33%).
const PUPIL_WIDTHS: [u32; 7] = [8, 9, 10, 11, 12, 13, 14];

/// Detector with scripted output, standing in for a cascade classifier.
struct ScriptedDetector {
    faces: Vec<Rect>,
    eyes: Vec<Rect>,
}

impl FeatureDetector for ScriptedDetector {
    fn detect_faces(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<Rect> {
        self.faces.clone()
    }

    fn detect_eyes(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<Rect> {
        self.eyes.clone()
    }
}

struct SharedCharacteristic(Rc<RefCell<Vec<Vec<u8>>>>);

impl Characteristic for SharedCharacteristic {
    fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        self.0.borrow_mut().push(bytes.to_vec());
        Ok(())
    }
}

#[derive(Default)]
struct LoopbackTransport {
    writes: Rc<RefCell<Vec<Vec<u8>>>>,
    missing_characteristic: bool,
}

impl Transport for LoopbackTransport {
    fn request_device(&mut self, _filter: &DeviceFilter) -> Result<String, LinkError> {
        Ok("gaze-receiver".into())
    }

    fn connect(&mut self, _device: &str) -> Result<(), LinkError> {
        Ok(())
    }

    fn characteristic(
        &mut self,
        _service: u16,
        characteristic: u16,
    ) -> Result<Box<dyn Characteristic>, LinkError> {
        if self.missing_characteristic {
            return Err(LinkError::CharacteristicNotFound(characteristic));
        }
        Ok(Box::new(SharedCharacteristic(Rc::clone(&self.writes))))
    }

    fn disconnect(&mut self) {}
}

fn rect(x: i32, y: i32, w: u32, h: u32) -> Rect {
    Rect::new(x, y, w, h).unwrap()
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

/// Bright frame with a dark `pupil_w` × 14 block whose centre column is `pupil_cx`.
fn frame_with_pupil(pupil_cx: u32, pupil_w: u32) -> Frame {
    let x0 = pupil_cx - pupil_w / 2;
    let mut data = vec![SKIN; (FRAME_W * FRAME_H) as usize];
    for y in 43..57 {
        for x in x0..x0 + pupil_w {
            data[(y * FRAME_W + x) as usize] = PUPIL;
        }
    }
    Frame::from_gray(FRAME_W, FRAME_H, data).unwrap()
}

/// Face covering the frame, eyes at x = 50 and x = 120 (30 × 20 each).
fn detector() -> ScriptedDetector {
    ScriptedDetector {
        faces: vec![rect(0, 0, FRAME_W, FRAME_H)],
        eyes: vec![rect(120, 40, 30, 20), rect(50, 40, 30, 20)],
    }
}

fn run_ticks<D: FeatureDetector>(
    pipeline: &mut GazeLink<D>,
    frame: &Frame,
    from_ms: u64,
    to_ms: u64,
) -> Vec<Direction> {
    (from_ms..to_ms)
        .step_by(16)
        .filter_map(|t| pipeline.tick(frame, ms(t)).dispatch)
        .map(|d| d.payload.direction())
        .collect()
}

#[test]
fn left_gaze_is_sent_once_after_settling() {
    // Eye spans x 50..80; pupils centred near x = 59 give ratio ~0.30
    for pupil_w in PUPIL_WIDTHS {
        let mut transport = LoopbackTransport::default();
        let mut pipeline = GazeLink::new(detector(), GazeConfig::default()).unwrap();
        pipeline.connect_with(&mut transport).unwrap();

        let frame = frame_with_pupil(59, pupil_w);

        let first = pipeline.tick(&frame, ms(0));
        assert_eq!(first.direction, Direction::Left, "pupil width {pupil_w}");
        assert!(first.dispatch.is_none());
        assert_eq!(
            first.geometry.eyes,
            vec![rect(50, 40, 30, 20), rect(120, 40, 30, 20)]
        );
        let centroid = first.geometry.centroid.unwrap();
        assert!((centroid.x - 59.0).abs() <= 0.5, "centroid {}", centroid.x);

        let sent = run_ticks(&mut pipeline, &frame, 16, 1000);
        assert_eq!(sent, vec![Direction::Left]);
        assert_eq!(transport.writes.borrow().as_slice(), &[b"LEFT".to_vec()]);

        let written = transport.writes.borrow()[0].clone();
        assert_eq!(
            Direction::from_payload(&written),
            pipeline.debouncer().last_sent()
        );
    }
}

#[test]
fn centred_pupil_is_center() {
    let mut pipeline = GazeLink::new(detector(), GazeConfig::default()).unwrap();
    for pupil_w in PUPIL_WIDTHS {
        let report = pipeline.tick(&frame_with_pupil(65, pupil_w), ms(0));
        assert_eq!(report.direction, Direction::Center, "pupil width {pupil_w}");
        assert!(report.geometry.centroid.is_some());
    }
}

#[test]
fn unmirrored_view_reports_right() {
    let config = GazeConfig::default().mirrored(false);
    let mut pipeline = GazeLink::new(detector(), config).unwrap();
    for pupil_w in PUPIL_WIDTHS {
        let report = pipeline.tick(&frame_with_pupil(59, pupil_w), ms(0));
        assert_eq!(report.direction, Direction::Right, "pupil width {pupil_w}");
    }
}

#[test]
fn squashed_left_eye_is_a_blink_regardless_of_pixels() {
    let detector = ScriptedDetector {
        faces: vec![rect(0, 0, FRAME_W, FRAME_H)],
        eyes: vec![rect(50, 45, 30, 6), rect(120, 40, 30, 20)],
    };
    let mut pipeline = GazeLink::new(detector, GazeConfig::default()).unwrap();
    for frame in [frame_with_pupil(59, 9), frame_with_pupil(72, 9)] {
        let report = pipeline.tick(&frame, ms(0));
        assert_eq!(report.direction, Direction::Blink);
        assert!(report.geometry.centroid.is_none());
    }
}

#[test]
fn no_faces_means_no_sends() {
    let mut transport = LoopbackTransport::default();
    let detector = ScriptedDetector {
        faces: vec![],
        eyes: vec![rect(50, 40, 30, 20), rect(120, 40, 30, 20)],
    };
    let mut pipeline = GazeLink::new(detector, GazeConfig::default()).unwrap();
    pipeline.connect_with(&mut transport).unwrap();

    let sent = run_ticks(&mut pipeline, &frame_with_pupil(59, 9), 0, 2000);
    assert!(sent.is_empty());
    assert!(transport.writes.borrow().is_empty());
}

#[test]
fn transport_drop_resets_debounce_state() {
    let mut transport = LoopbackTransport::default();
    let mut pipeline = GazeLink::new(detector(), GazeConfig::default()).unwrap();
    pipeline.connect_with(&mut transport).unwrap();

    let frame = frame_with_pupil(59, 9);
    assert_eq!(run_ticks(&mut pipeline, &frame, 0, 500), vec![Direction::Left]);

    // Arm a pending send, then lose the link mid-settle
    pipeline.tick(&frame_with_pupil(72, 9), ms(500));
    assert!(pipeline.debouncer().pending().is_some());
    assert!(pipeline.on_transport_disconnect());

    assert_eq!(pipeline.link().state(), LinkState::Disconnected);
    assert!(!pipeline.link().has_characteristic());
    assert_eq!(pipeline.debouncer().last_sent(), None);
    assert!(pipeline.debouncer().pending().is_none());
    assert!(pipeline.poll(ms(10_000)).is_none());

    // After reconnecting, the same direction goes out again
    pipeline.connect_with(&mut transport).unwrap();
    let sent = run_ticks(&mut pipeline, &frame, 20_000, 20_500);
    assert_eq!(sent, vec![Direction::Left]);
    assert_eq!(transport.writes.borrow().len(), 2);
}

#[test]
fn sends_while_disconnected_are_skipped() {
    let mut pipeline = GazeLink::new(detector(), GazeConfig::default()).unwrap();
    let frame = frame_with_pupil(59, 9);
    pipeline.tick(&frame, ms(0));
    let dispatch = pipeline.poll(ms(200)).unwrap();
    assert_eq!(dispatch.payload.direction(), Direction::Left);
    assert_eq!(dispatch.outcome, SendOutcome::Skipped);
}

#[test]
fn failed_connect_leaves_no_handle() {
    let mut transport = LoopbackTransport {
        missing_characteristic: true,
        ..LoopbackTransport::default()
    };
    let mut pipeline = GazeLink::new(detector(), GazeConfig::default()).unwrap();
    let err = pipeline.connect_with(&mut transport).unwrap_err();
    assert!(matches!(err, LinkError::CharacteristicNotFound(_)));
    assert_eq!(pipeline.link().state(), LinkState::Disconnected);
    assert!(!pipeline.link().has_characteristic());
    assert!(pipeline.status().starts_with("Disconnected: "));
}

#[test]
fn gaze_sweep_passes_through_center() {
    let mut pipeline = GazeLink::new(detector(), GazeConfig::default()).unwrap();
    for pupil_w in PUPIL_WIDTHS {
        let mut seen: Vec<Direction> = Vec::new();
        // Pupil centre moves across the eye at x = 50..80, staying one column inside
        let first = 50 + pupil_w / 2 + 1;
        let last = 80 - pupil_w + pupil_w / 2 - 1;
        for cx in first..=last {
            let direction = pipeline.tick(&frame_with_pupil(cx, pupil_w), ms(0)).direction;
            if seen.last() != Some(&direction) {
                seen.push(direction);
            }
        }
        assert_eq!(
            seen,
            vec![Direction::Left, Direction::Center, Direction::Right],
            "pupil width {pupil_w}"
        );
    }
}
