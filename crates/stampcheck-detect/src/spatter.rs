//! Weld spatter as small blobs left by morphological hat transforms.

use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_close, grayscale_open, Mask};
use imageproc::region_labelling::{connected_components, Connectivity};
use stampcheck_core::{GrayImageView, Point2};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::params::{SpatterParams, SpatterPolarity};
use crate::types::{SpatterMark, SpatterReport};

/// Foreground where the black-hat and/or top-hat response reaches `min_contrast`.
fn hat_mask(img: &GrayImage, params: &SpatterParams) -> GrayImage {
    let mask = Mask::square(params.kernel_radius.min(u8::MAX as usize) as u8);
    let min = params.min_contrast;
    let mut out = GrayImage::new(img.width(), img.height());

    if matches!(params.polarity, SpatterPolarity::Dark | SpatterPolarity::Both) {
        let closed = grayscale_close(img, &mask);
        for ((o, c), s) in out.iter_mut().zip(closed.iter()).zip(img.iter()) {
            if c.saturating_sub(*s) >= min {
                *o = 255;
            }
        }
    }
    if matches!(params.polarity, SpatterPolarity::Bright | SpatterPolarity::Both) {
        let opened = grayscale_open(img, &mask);
        for ((o, p), s) in out.iter_mut().zip(opened.iter()).zip(img.iter()) {
            if s.saturating_sub(*p) >= min {
                *o = 255;
            }
        }
    }
    out
}

#[derive(Clone, Copy)]
struct BlobStats {
    area: u32,
    sx: u64,
    sy: u64,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl BlobStats {
    fn new(x: u32, y: u32) -> Self {
        Self {
            area: 0,
            sx: 0,
            sy: 0,
            x0: x,
            y0: y,
            x1: x,
            y1: y,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.sx += x as u64;
        self.sy += y as u64;
        self.x0 = self.x0.min(x);
        self.y0 = self.y0.min(y);
        self.x1 = self.x1.max(x);
        self.y1 = self.y1.max(y);
    }
}

/// Find spatter blobs. Marks are ordered top-to-bottom, then left-to-right.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, params), fields(w = img.width, h = img.height))
)]
pub fn detect_spatter(img: &GrayImageView<'_>, params: &SpatterParams) -> SpatterReport {
    if img.is_empty() || params.kernel_radius == 0 {
        return SpatterReport::default();
    }
    let Some(luma) = crate::to_luma(img) else {
        return SpatterReport::default();
    };
    let mask_img = hat_mask(&luma, params);
    let labels = connected_components(&mask_img, Connectivity::Eight, Luma([0u8]));

    let mut blobs: Vec<Option<BlobStats>> = Vec::new();
    for (x, y, px) in labels.enumerate_pixels() {
        let label = px[0] as usize;
        if label == 0 {
            continue;
        }
        if blobs.len() < label {
            blobs.resize(label, None);
        }
        blobs[label - 1]
            .get_or_insert_with(|| BlobStats::new(x, y))
            .add(x, y);
    }

    let mut marks: Vec<SpatterMark> = blobs
        .into_iter()
        .flatten()
        .filter(|b| b.area >= params.min_area && b.area <= params.max_area)
        .map(|b| SpatterMark {
            center: Point2::new(
                b.sx as f32 / b.area as f32,
                b.sy as f32 / b.area as f32,
            ),
            bbox: [b.x0, b.y0, b.x1, b.y1],
            area: b.area,
        })
        .collect();
    marks.sort_by_key(|m| (m.bbox[1], m.bbox[0]));

    log::debug!("spatter: {} blobs", marks.len());
    SpatterReport {
        count: marks.len(),
        marks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampcheck_core::render::fill_disk;

    fn plate_with_dots(dots: &[(f32, f32, u8)]) -> stampcheck_core::GrayImage {
        let mut img = stampcheck_core::GrayImage::filled(100, 80, 120);
        for &(x, y, v) in dots {
            fill_disk(&mut img, Point2::new(x, y), 2.5, v);
        }
        img
    }

    #[test]
    fn counts_dark_and_bright_dots() {
        let img = plate_with_dots(&[(20.0, 20.0, 0), (60.0, 30.0, 0), (40.0, 60.0, 255)]);
        let params = SpatterParams {
            polarity: SpatterPolarity::Both,
            ..SpatterParams::default()
        };
        let report = detect_spatter(&img.view(), &params);
        assert_eq!(report.count, 3);
        let m = report.marks[0];
        assert!((m.center.x - 20.0).abs() < 1.0 && (m.center.y - 20.0).abs() < 1.0);
    }

    #[test]
    fn polarity_filters_blobs() {
        let img = plate_with_dots(&[(20.0, 20.0, 0), (40.0, 60.0, 255), (70.0, 60.0, 255)]);
        assert_eq!(detect_spatter(&img.view(), &SpatterParams::default()).count, 1);
        let params = SpatterParams {
            polarity: SpatterPolarity::Bright,
            ..SpatterParams::default()
        };
        assert_eq!(detect_spatter(&img.view(), &params).count, 2);
    }

    #[test]
    fn dots_touching_the_border_are_found() {
        let img = plate_with_dots(&[(2.0, 2.0, 0), (98.0, 40.0, 0)]);
        let report = detect_spatter(&img.view(), &SpatterParams::default());
        assert_eq!(report.count, 2);
        assert_eq!(report.marks[0].bbox[0], 0);
        assert_eq!(report.marks[1].bbox[2], 99);
    }

    #[test]
    fn large_features_are_not_spatter() {
        let mut img = stampcheck_core::GrayImage::filled(100, 80, 200);
        for y in 38..43 {
            for x in 5..95 {
                img.set(x, y, 0);
            }
        }
        assert_eq!(detect_spatter(&img.view(), &SpatterParams::default()).count, 0);
    }

    #[test]
    fn clean_plate_has_no_spatter() {
        let img = stampcheck_core::GrayImage::filled(50, 50, 180);
        let report = detect_spatter(&img.view(), &SpatterParams::default());
        assert_eq!(report, SpatterReport::default());
    }
}
