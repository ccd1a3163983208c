//! Anti-aliased fills for building grayscale test scenes.
//!
//! Coverage is estimated with a fixed 4x4 sub-pixel grid; pixel `(x, y)` spans
//! `[x - 0.5, x + 0.5] x [y - 0.5, y + 0.5]`.

use nalgebra::Point2;

use crate::image::GrayImage;

const SUB: usize = 4;

fn sub_offsets() -> [f32; SUB] {
    let mut out = [0.0; SUB];
    for (k, o) in out.iter_mut().enumerate() {
        *o = (k as f32 + 0.5) / SUB as f32 - 0.5;
    }
    out
}

fn blend(img: &mut GrayImage, x: usize, y: usize, value: u8, coverage: f32) {
    if coverage <= 0.0 {
        return;
    }
    let old = img.get(x, y) as f32;
    let v = old + (value as f32 - old) * coverage.min(1.0);
    img.set(x, y, v.round().clamp(0.0, 255.0) as u8);
}

fn fill_shape(
    img: &mut GrayImage,
    bbox: (f32, f32, f32, f32),
    value: u8,
    inside: impl Fn(f32, f32) -> bool,
) {
    if img.width == 0 || img.height == 0 {
        return;
    }
    let (bx0, by0, bx1, by1) = bbox;
    let x0 = (bx0 - 1.0).floor().max(0.0) as usize;
    let y0 = (by0 - 1.0).floor().max(0.0) as usize;
    let x1 = ((bx1 + 1.0).ceil().max(0.0) as usize).min(img.width - 1);
    let y1 = ((by1 + 1.0).ceil().max(0.0) as usize).min(img.height - 1);
    if x0 > x1 || y0 > y1 {
        return;
    }
    let offs = sub_offsets();
    for y in y0..=y1 {
        for x in x0..=x1 {
            let mut hits = 0usize;
            for &oy in &offs {
                for &ox in &offs {
                    if inside(x as f32 + ox, y as f32 + oy) {
                        hits += 1;
                    }
                }
            }
            blend(img, x, y, value, hits as f32 / (SUB * SUB) as f32);
        }
    }
}

/// Fill a disk of `radius` around `center`.
pub fn fill_disk(img: &mut GrayImage, center: Point2<f32>, radius: f32, value: u8) {
    let r2 = radius * radius;
    fill_shape(
        img,
        (
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        ),
        value,
        |x, y| {
            let dx = x - center.x;
            let dy = y - center.y;
            dx * dx + dy * dy <= r2
        },
    );
}

/// Fill the continuous rectangle `[x0, x1] x [y0, y1]`.
pub fn fill_rect(img: &mut GrayImage, x0: f32, y0: f32, x1: f32, y1: f32, value: u8) {
    fill_shape(img, (x0, y0, x1, y1), value, |x, y| {
        x >= x0 && x <= x1 && y >= y0 && y <= y1
    });
}

/// Draw a segment with flat caps and the given total `thickness`.
pub fn draw_segment(
    img: &mut GrayImage,
    a: Point2<f32>,
    b: Point2<f32>,
    thickness: f32,
    value: u8,
) {
    let d = b - a;
    let len = d.norm();
    if len <= f32::EPSILON {
        return;
    }
    let u = d / len;
    let half = 0.5 * thickness;
    fill_shape(
        img,
        (
            a.x.min(b.x) - half,
            a.y.min(b.y) - half,
            a.x.max(b.x) + half,
            a.y.max(b.y) + half,
        ),
        value,
        |x, y| {
            let px = x - a.x;
            let py = y - a.y;
            let along = px * u.x + py * u.y;
            let across = px * u.y - py * u.x;
            (0.0..=len).contains(&along) && across.abs() <= half
        },
    );
}
