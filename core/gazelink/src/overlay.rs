use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect as DrawRect;

use crate::classifier::DebugGeometry;
use crate::geometry::Rect;

const FACE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const EYE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CENTROID_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

fn to_draw_rect(rect: &Rect) -> DrawRect {
    DrawRect::at(rect.x, rect.y).of_size(rect.width, rect.height)
}

/// Draw the face box, eye boxes and pupil centroid onto `canvas`.
///
/// Shapes falling outside the canvas are clipped.
pub fn draw_overlay(canvas: &mut RgbImage, geometry: &DebugGeometry) {
    if let Some(face) = &geometry.face {
        draw_hollow_rect_mut(canvas, to_draw_rect(face), FACE_COLOR);
    }
    for eye in &geometry.eyes {
        draw_hollow_rect_mut(canvas, to_draw_rect(eye), EYE_COLOR);
    }
    if let Some(centroid) = geometry.centroid {
        draw_cross_mut(
            canvas,
            CENTROID_COLOR,
            centroid.x.round() as i32,
            centroid.y.round() as i32,
        );
    }
}
