//! Image source abstraction and a synthetic part generator.

use nalgebra::{Point2, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use stampcheck_core::render::{draw_segment, fill_disk, fill_rect};
use stampcheck_core::GrayImage;

use crate::error::AcquireError;

/// Supplier of grayscale frames.
pub trait ImageSource: Send + Sync {
    /// Grab one frame.
    fn capture(&self) -> Result<GrayImage, AcquireError>;

    /// Frame to inspect when [`capture`](Self::capture) fails.
    fn placeholder(&self) -> GrayImage;
}

const BACKGROUND: u8 = 255;
const PLATE: u8 = 200;
const FEATURE: u8 = 0;
const PART_MARGIN: f32 = 40.0;
const HOLE_OFFSET: f32 = 70.0;
const WELD_THICKNESS: f32 = 5.0;

/// What the synthetic part looks like.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticPart {
    pub width: usize,
    pub height: usize,
    pub part_missing: bool,
    pub no_welding: bool,
    pub spatter: bool,
    /// Seed of the spatter generator.
    pub seed: u64,
    /// Diameters of the top-left, top-right, bottom-left, bottom-right holes.
    pub hole_diameters: [f32; 4],
}

impl Default for SyntheticPart {
    fn default() -> Self {
        Self {
            width: 600,
            height: 400,
            part_missing: false,
            no_welding: false,
            spatter: false,
            seed: 7,
            hole_diameters: [40.0; 4],
        }
    }
}

impl SyntheticPart {
    /// Hole centers in measurement order.
    pub fn hole_centers(&self) -> [Point2<f32>; 4] {
        let cx = 0.5 * self.width as f32;
        let cy = 0.5 * self.height as f32;
        [
            Point2::new(cx - HOLE_OFFSET, cy - HOLE_OFFSET),
            Point2::new(cx + HOLE_OFFSET, cy - HOLE_OFFSET),
            Point2::new(cx - HOLE_OFFSET, cy + HOLE_OFFSET),
            Point2::new(cx + HOLE_OFFSET, cy + HOLE_OFFSET),
        ]
    }

    /// Rim-to-rim seam lengths: top, bottom, left, right.
    pub fn seam_lengths(&self) -> [f32; 4] {
        let d = &self.hole_diameters;
        let span = 2.0 * HOLE_OFFSET;
        [
            span - 0.5 * (d[0] + d[1]),
            span - 0.5 * (d[2] + d[3]),
            span - 0.5 * (d[0] + d[2]),
            span - 0.5 * (d[1] + d[3]),
        ]
    }

    pub fn render(&self) -> GrayImage {
        let mut img = GrayImage::filled(self.width, self.height, BACKGROUND);
        if self.part_missing {
            return img;
        }
        let (x1, y1) = (
            self.width as f32 - PART_MARGIN,
            self.height as f32 - PART_MARGIN,
        );
        fill_rect(&mut img, PART_MARGIN, PART_MARGIN, x1, y1, PLATE);

        let centers = self.hole_centers();
        let radii = self.hole_diameters.map(|d| 0.5 * d);
        for (c, r) in centers.iter().zip(radii) {
            fill_disk(&mut img, *c, r, FEATURE);
        }

        if !self.no_welding {
            for (a, b) in [(0usize, 1usize), (2, 3), (0, 2), (1, 3)] {
                let dir: Vector2<f32> = (centers[b] - centers[a]).normalize();
                draw_segment(
                    &mut img,
                    centers[a] + dir * radii[a],
                    centers[b] - dir * radii[b],
                    WELD_THICKNESS,
                    FEATURE,
                );
            }
        }

        let (sx0, sy0) = (PART_MARGIN + 10.0, PART_MARGIN + 10.0);
        if self.spatter && x1 - 10.0 > sx0 && y1 - 10.0 > sy0 {
            let mut rng = StdRng::seed_from_u64(self.seed);
            let count: usize = rng.gen_range(20..80);
            for _ in 0..count {
                let x = rng.gen_range(sx0..x1 - 10.0);
                let y = rng.gen_range(sy0..y1 - 10.0);
                let r = rng.gen_range(1u32..4) as f32;
                fill_disk(&mut img, Point2::new(x.floor(), y.floor()), r, FEATURE);
            }
        }
        img
    }
}

/// [`ImageSource`] that renders [`SyntheticPart`]s, optionally failing capture.
#[derive(Clone, Debug, Default)]
pub struct SyntheticCamera {
    pub part: SyntheticPart,
    pub fail_capture: bool,
}

impl SyntheticCamera {
    pub fn new(part: SyntheticPart) -> Self {
        Self {
            part,
            fail_capture: false,
        }
    }

    pub fn failing(part: SyntheticPart) -> Self {
        Self {
            part,
            fail_capture: true,
        }
    }
}

impl ImageSource for SyntheticCamera {
    fn capture(&self) -> Result<GrayImage, AcquireError> {
        if self.fail_capture {
            return Err(AcquireError::Unavailable(
                "synthetic camera configured to fail".to_string(),
            ));
        }
        Ok(self.part.render())
    }

    fn placeholder(&self) -> GrayImage {
        SyntheticPart {
            width: self.part.width,
            height: self.part.height,
            ..SyntheticPart::default()
        }
        .render()
    }
}
