//! Overlay rendering for persisted inspection artifacts.

use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_ellipse_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;
use stampcheck_core::GrayImageView;

use crate::classify::{Classification, Verdict};
use crate::font::{draw_text, text_width, GLYPH_H};
use crate::inspector::Detections;

const OK_COLOR: Rgb<u8> = Rgb([0, 170, 0]);
const NOK_COLOR: Rgb<u8> = Rgb([210, 0, 0]);
const HOLE_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
const SEAM_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
const SPATTER_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_BG: Rgb<u8> = Rgb([0, 0, 0]);

const BANNER_SCALE: u32 = 3;
const BANNER_PAD: i32 = 4;

fn gray_to_rgb(img: &GrayImageView<'_>) -> RgbImage {
    RgbImage::from_fn(img.width as u32, img.height as u32, |x, y| {
        let v = img.get(x as usize, y as usize);
        Rgb([v, v, v])
    })
}

fn label(img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let w = text_width(text, 1);
    if w > 0 {
        draw_filled_rect_mut(
            img,
            Rect::at(x - 1, y - 1).of_size(w + 2, GLYPH_H + 2),
            LABEL_BG,
        );
    }
    draw_text(img, x, y, text, 1, color);
}

/// Render the overlay onto a fresh RGB copy of `img`.
pub fn annotate(
    img: &GrayImageView<'_>,
    detections: &Detections,
    classification: &Classification,
) -> RgbImage {
    let mut out = gray_to_rgb(img);
    if out.width() == 0 || out.height() == 0 {
        return out;
    }

    for hole in &detections.holes {
        let c = (hole.center.x.round() as i32, hole.center.y.round() as i32);
        let rx = (0.5 * hole.width).round().max(1.0) as i32;
        let ry = (0.5 * hole.height).round().max(1.0) as i32;
        draw_hollow_ellipse_mut(&mut out, c, rx, ry, HOLE_COLOR);
        draw_line_segment_mut(
            &mut out,
            ((c.0 - 3) as f32, c.1 as f32),
            ((c.0 + 3) as f32, c.1 as f32),
            HOLE_COLOR,
        );
        draw_line_segment_mut(
            &mut out,
            (c.0 as f32, (c.1 - 3) as f32),
            (c.0 as f32, (c.1 + 3) as f32),
            HOLE_COLOR,
        );
        let text = format!("{:.1}/{:.1}", hole.width, hole.height);
        let tx = c.0 - text_width(&text, 1) as i32 / 2;
        label(&mut out, tx, c.1 + ry + 3, &text, HOLE_COLOR);
    }

    for seam in &detections.seams {
        let Some((a, b)) = seam.span else {
            continue;
        };
        if seam.length > 0.0 {
            draw_line_segment_mut(&mut out, (a.x, a.y), (b.x, b.y), SEAM_COLOR);
        }
        let text = format!("{:.1}", seam.length);
        let mid = nalgebra::center(&a, &b);
        let horizontal = (b.x - a.x).abs() >= (b.y - a.y).abs();
        let (tx, ty) = if horizontal {
            (mid.x as i32 - text_width(&text, 1) as i32 / 2, mid.y as i32 - 14)
        } else {
            (mid.x as i32 + 8, mid.y as i32 - GLYPH_H as i32 / 2)
        };
        label(&mut out, tx, ty, &text, SEAM_COLOR);
    }

    for mark in &detections.spatter.marks {
        let [x0, y0, x1, y1] = mark.bbox;
        draw_hollow_rect_mut(
            &mut out,
            Rect::at(x0 as i32 - 2, y0 as i32 - 2).of_size(x1 - x0 + 5, y1 - y0 + 5),
            SPATTER_COLOR,
        );
    }

    let banner_color = match classification.verdict {
        Verdict::Ok => OK_COLOR,
        Verdict::Nok => NOK_COLOR,
    };
    let banner_h = GLYPH_H * BANNER_SCALE + 2 * BANNER_PAD as u32;
    let out_w = out.width();
    draw_filled_rect_mut(
        &mut out,
        Rect::at(0, 0).of_size(out_w, banner_h),
        banner_color,
    );
    let verdict = classification.verdict.as_str();
    draw_text(
        &mut out,
        BANNER_PAD * 2,
        BANNER_PAD,
        verdict,
        BANNER_SCALE,
        TEXT_COLOR,
    );
    let summary = format!(
        "HOLES {}  SPATTER {}",
        detections.holes.len(),
        detections.spatter.count
    );
    let sx = BANNER_PAD * 4 + text_width(verdict, BANNER_SCALE) as i32;
    draw_text(
        &mut out,
        sx,
        (banner_h as i32 - GLYPH_H as i32) / 2,
        &summary,
        1,
        TEXT_COLOR,
    );

    let mut y = banner_h as i32 + 4;
    for defect in &classification.defects {
        label(&mut out, BANNER_PAD * 2, y, &defect.to_string(), NOK_COLOR);
        y += GLYPH_H as i32 + 4;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Defect, MeasurementVector};
    use nalgebra::Point2;
    use stampcheck_core::GrayImage;
    use stampcheck_detect::{
        Hole, HoleLayout, PresenceReport, SeamEdge, SpatterMark, SpatterReport, WeldSeam,
    };

    fn detections() -> Detections {
        let hole = Hole {
            center: Point2::new(60.0, 60.0),
            width: 30.0,
            height: 30.0,
            confidence: 1.0,
        };
        Detections {
            presence: PresenceReport {
                present: true,
                mean: 180.0,
                range: 200,
            },
            holes: vec![hole],
            layout: HoleLayout {
                top_left: Some(hole),
                ..HoleLayout::default()
            },
            seams: [
                WeldSeam {
                    edge: SeamEdge::Top,
                    length: 50.0,
                    span: Some((Point2::new(80.0, 60.0), Point2::new(130.0, 60.0))),
                },
                WeldSeam::unmeasured(SeamEdge::Bottom),
                WeldSeam::unmeasured(SeamEdge::Left),
                WeldSeam::unmeasured(SeamEdge::Right),
            ],
            spatter: SpatterReport {
                count: 1,
                marks: vec![SpatterMark {
                    center: Point2::new(100.0, 100.0),
                    bbox: [99, 99, 101, 101],
                    area: 9,
                }],
            },
        }
    }

    fn classification(verdict: Verdict) -> Classification {
        let defects = match verdict {
            Verdict::Ok => vec![],
            Verdict::Nok => vec![Defect::HoleCount {
                found: 1,
                expected: 4,
            }],
        };
        Classification {
            verdict,
            reason: defects.first().cloned(),
            defects,
            measurements: MeasurementVector::zeros(),
        }
    }

    #[test]
    fn banner_color_follows_verdict() {
        let img = GrayImage::filled(160, 140, 128);
        let ok = annotate(&img.view(), &detections(), &classification(Verdict::Ok));
        let nok = annotate(&img.view(), &detections(), &classification(Verdict::Nok));
        assert_eq!(*ok.get_pixel(159, 1), OK_COLOR);
        assert_eq!(*nok.get_pixel(159, 1), NOK_COLOR);
    }

    #[test]
    fn source_is_untouched_and_overlay_is_deterministic() {
        let img = GrayImage::filled(160, 140, 128);
        let before = img.clone();
        let a = annotate(&img.view(), &detections(), &classification(Verdict::Nok));
        let b = annotate(&img.view(), &detections(), &classification(Verdict::Nok));
        assert_eq!(img, before);
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), (160, 140));
        // Hole rim at the rightmost point of the ellipse.
        assert_eq!(*a.get_pixel(75, 60), HOLE_COLOR);
        // Far corner keeps the source gray.
        assert_eq!(*a.get_pixel(159, 139), Rgb([128, 128, 128]));
    }
}
