use nalgebra::Point2;
use stampcheck_core::render::{draw_segment, fill_disk, fill_rect};
use stampcheck_core::GrayImage;

pub const WIDTH: usize = 600;
pub const HEIGHT: usize = 400;

/// Hole centers: top-left, top-right, bottom-left, bottom-right.
pub const CENTERS: [(f32, f32); 4] = [(230.0, 130.0), (370.0, 130.0), (230.0, 270.0), (370.0, 270.0)];

/// Radii for diameters 36, 38, 40, 42.
pub const RADII: [f32; 4] = [18.0, 19.0, 20.0, 21.0];

/// Rim-to-rim lengths for top, bottom, left, right.
pub const SEAM_LENGTHS: [f32; 4] = [103.0, 99.0, 102.0, 100.0];

/// White fixture, grey plate, four black holes joined by black seams.
pub fn stamped_part(weld: bool) -> GrayImage {
    let mut img = GrayImage::filled(WIDTH, HEIGHT, 255);
    fill_rect(&mut img, 40.0, 40.0, 560.0, 360.0, 200);
    for (&(x, y), &r) in CENTERS.iter().zip(RADII.iter()) {
        fill_disk(&mut img, Point2::new(x, y), r, 0);
    }
    if weld {
        for (a, b) in [(0usize, 1usize), (2, 3), (0, 2), (1, 3)] {
            let ca = Point2::new(CENTERS[a].0, CENTERS[a].1);
            let cb = Point2::new(CENTERS[b].0, CENTERS[b].1);
            let d = (cb - ca).normalize();
            draw_segment(&mut img, ca + d * RADII[a], cb - d * RADII[b], 5.0, 0);
        }
    }
    img
}

pub fn blank(value: u8) -> GrayImage {
    GrayImage::filled(WIDTH, HEIGHT, value)
}
