//! Weld seam length along the four part edges.
//!
//! Each edge joins two neighbouring holes of the [`HoleLayout`]. The seam is
//! probed on the rim-to-rim path: a sample counts as weld when the band across
//! the path deviates strongly from the surface level beside it.

use nalgebra::{Point2, Vector2};
use stampcheck_core::{sample_bilinear, GrayImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::params::SeamParams;
use crate::types::{Hole, HoleLayout, SeamEdge, WeldSeam};

fn edge_holes(layout: &HoleLayout, edge: SeamEdge) -> (Option<Hole>, Option<Hole>) {
    match edge {
        SeamEdge::Top => (layout.top_left, layout.top_right),
        SeamEdge::Bottom => (layout.bottom_left, layout.bottom_right),
        SeamEdge::Left => (layout.top_left, layout.bottom_left),
        SeamEdge::Right => (layout.top_right, layout.bottom_right),
    }
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

fn measure_between(
    img: &GrayImageView<'_>,
    edge: SeamEdge,
    a: &Hole,
    b: &Hole,
    params: &SeamParams,
) -> WeldSeam {
    let delta: Vector2<f32> = b.center - a.center;
    let dist = delta.norm();
    if dist <= f32::EPSILON {
        return WeldSeam::unmeasured(edge);
    }
    let d = delta / dist;
    let start = a.center + d * a.radius_along(d.x, d.y);
    let end = b.center - d * b.radius_along(-d.x, -d.y);
    let path_len = (end - start).dot(&d);
    if path_len <= 0.0 {
        return WeldSeam {
            edge,
            length: 0.0,
            span: Some((start, start)),
        };
    }

    let step = if params.step > 0.0 { params.step } else { 0.5 };
    let n = Vector2::new(-d.y, d.x);
    let bh = params.band_half_width.max(0.0);
    let off = bh + params.surface_offset.max(1.0);
    let band_probes = (2.0 * bh).floor() as usize + 1;

    let at = |p: Point2<f32>| sample_bilinear(img, p.x, p.y);
    let mut weld = 0usize;
    let mut t = 0.0f32;
    while t <= path_len {
        let p = start + d * t;
        let mut surf = [0.0f32; 6];
        for (k, s) in [-1.0f32, 0.0, 1.0].into_iter().enumerate() {
            let q = p + d * s;
            surf[2 * k] = at(q + n * off);
            surf[2 * k + 1] = at(q - n * off);
        }
        let surface = median(&mut surf);
        let deviation = (0..band_probes)
            .map(|k| (at(p + n * (k as f32 - bh)) - surface).abs())
            .fold(0.0f32, f32::max);
        if deviation >= params.min_contrast {
            weld += 1;
        }
        t += step;
    }

    let length = (weld as f32 * step).min(path_len);
    WeldSeam {
        edge,
        length,
        span: Some((start, end)),
    }
}

/// Measure all four seams. Edges missing a hole report length `0.0`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, layout, params), fields(holes = layout.count()))
)]
pub fn measure_seams(
    img: &GrayImageView<'_>,
    layout: &HoleLayout,
    params: &SeamParams,
) -> [WeldSeam; 4] {
    SeamEdge::ALL.map(|edge| match edge_holes(layout, edge) {
        (Some(a), Some(b)) => {
            let seam = measure_between(img, edge, &a, &b, params);
            log::debug!("seam {}: {:.2}px", edge.name(), seam.length);
            seam
        }
        _ => {
            log::debug!("seam {}: missing anchor hole", edge.name());
            WeldSeam::unmeasured(edge)
        }
    })
}
