//! Run the gaze classifier on still images and write annotated copies.
//!
//! Usage:
//!   cargo run --example debug_gaze --features rustface -- <model.bin> <image>...
//!
//! Each `<image>` is written back as `<image>.gaze.png` with face, eye and
//! pupil overlays.

use std::time::Duration;

use gazelink::{draw_overlay, Frame, GazeConfig, GazeLink, RustfaceDetector};

fn main() {
    let mut args = std::env::args().skip(1);
    let Some(model_path) = args.next() else {
        eprintln!("usage: debug_gaze <model.bin> <image>...");
        std::process::exit(2);
    };

    let detector = match RustfaceDetector::from_path(&model_path) {
        Ok(detector) => detector,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let mut pipeline =
        GazeLink::new(detector, GazeConfig::default()).expect("default config is valid");

    for (i, path) in args.enumerate() {
        let image = match image::open(&path) {
            Ok(image) => image,
            Err(e) => {
                eprintln!("{path}: {e}");
                continue;
            }
        };
        let frame = Frame::from_image(&image).expect("decoded image has pixels");

        // Space ticks past the settle delay so each image stands alone
        let report = pipeline.tick(&frame, Duration::from_secs(i as u64));

        println!(
            "=== {path} ({}x{}) → {}",
            frame.width(),
            frame.height(),
            report.direction
        );
        if let Some(face) = report.geometry.face {
            println!(
                "  face: ({}, {}, {}x{})",
                face.x, face.y, face.width, face.height
            );
        }
        for (side, eye) in ["left", "right"].iter().zip(&report.geometry.eyes) {
            println!(
                "  {side} eye: ({}, {}, {}x{}), aspect {:.2}",
                eye.x,
                eye.y,
                eye.width,
                eye.height,
                eye.aspect_ratio()
            );
        }
        if let Some(c) = report.geometry.centroid {
            println!("  pupil centroid: ({:.1}, {:.1})", c.x, c.y);
        }

        let mut canvas = image.to_rgb8();
        draw_overlay(&mut canvas, &report.geometry);
        let out = format!("{path}.gaze.png");
        match canvas.save(&out) {
            Ok(()) => println!("  → {out}"),
            Err(e) => eprintln!("  failed to write {out}: {e}"),
        }
    }
}
