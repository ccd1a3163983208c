//! Rim measurement around a proposed hole center.
//!
//! Rays are cast from the proposal to the mid-level crossing between the hole
//! interior and the surrounding surface. Agreeing rim points are then fitted
//! with an axis-aligned ellipse, giving the refined center plus width/height.

use nalgebra::{Matrix4, Point2, Vector4};
use stampcheck_core::{sample_bilinear, GrayImageView};

use crate::params::HoleParams;
use crate::types::Hole;

const RAY_STEP: f32 = 0.25;
const MIN_RAY_HITS: usize = 5;
const MIN_REFIT_POINTS: usize = 8;
const REFIT_RESIDUAL_PX: f64 = 1.0;

fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    })
}

fn ring_median(img: &GrayImageView<'_>, c: Point2<f32>, r: f32, n: usize) -> Option<f32> {
    let mut vals: Vec<f32> = (0..n)
        .map(|k| {
            let t = std::f32::consts::TAU * k as f32 / n as f32;
            sample_bilinear(img, c.x + r * t.cos(), c.y + r * t.sin())
        })
        .collect();
    median(&mut vals)
}

/// Distance along `(dx, dy)` where the profile first crosses `mid`.
fn ray_crossing(
    img: &GrayImageView<'_>,
    c: Point2<f32>,
    dx: f32,
    dy: f32,
    mid: f32,
    r_max: f32,
) -> Option<f32> {
    let mut prev = sample_bilinear(img, c.x, c.y) - mid;
    let mut r = RAY_STEP;
    while r <= r_max {
        let cur = sample_bilinear(img, c.x + dx * r, c.y + dy * r) - mid;
        if prev == 0.0 {
            return Some(r - RAY_STEP);
        }
        if prev.signum() != cur.signum() {
            let t = prev / (prev - cur);
            return Some(r - RAY_STEP + t * RAY_STEP);
        }
        prev = cur;
        r += RAY_STEP;
    }
    None
}

#[derive(Clone, Copy, Debug)]
struct Ellipse {
    cx: f64,
    cy: f64,
    a: f64,
    b: f64,
}

impl Ellipse {
    fn radius_along(&self, dx: f64, dy: f64) -> f64 {
        let n = (dx * dx + dy * dy).sqrt();
        if n <= f64::EPSILON {
            return self.a.min(self.b);
        }
        let (c, s) = (dx / n, dy / n);
        1.0 / ((c * c) / (self.a * self.a) + (s * s) / (self.b * self.b)).sqrt()
    }

    fn residual(&self, p: &Point2<f64>) -> f64 {
        let dx = p.x - self.cx;
        let dy = p.y - self.cy;
        ((dx * dx + dy * dy).sqrt() - self.radius_along(dx, dy)).abs()
    }
}

/// Least-squares fit of `A u^2 + B v^2 + C u + D v = 1` around `origin`.
fn fit_axis_aligned_ellipse(points: &[Point2<f64>], origin: Point2<f64>) -> Option<Ellipse> {
    if points.len() < 4 {
        return None;
    }
    let mut m = Matrix4::<f64>::zeros();
    let mut rhs = Vector4::<f64>::zeros();
    for p in points {
        let u = p.x - origin.x;
        let v = p.y - origin.y;
        let phi = Vector4::new(u * u, v * v, u, v);
        m += phi * phi.transpose();
        rhs += phi;
    }
    let sol = m.lu().solve(&rhs)?;
    let (a_, b_, c_, d_) = (sol[0], sol[1], sol[2], sol[3]);
    if a_ <= 0.0 || b_ <= 0.0 {
        return None;
    }
    let u0 = -c_ / (2.0 * a_);
    let v0 = -d_ / (2.0 * b_);
    let k = 1.0 + a_ * u0 * u0 + b_ * v0 * v0;
    if k <= 0.0 {
        return None;
    }
    let e = Ellipse {
        cx: origin.x + u0,
        cy: origin.y + v0,
        a: (k / a_).sqrt(),
        b: (k / b_).sqrt(),
    };
    (e.a.is_finite() && e.b.is_finite()).then_some(e)
}

/// Measure the hole around `center`, or `None` if it does not look like one.
pub fn measure_hole(
    img: &GrayImageView<'_>,
    center: Point2<f32>,
    params: &HoleParams,
) -> Option<Hole> {
    let rays = params.rays.max(MIN_RAY_HITS);

    let inner_r = (0.25 * params.min_radius).min(2.0);
    let mut inner_vals: Vec<f32> = std::iter::once(sample_bilinear(img, center.x, center.y))
        .chain((0..8).map(|k| {
            let t = std::f32::consts::TAU * k as f32 / 8.0;
            sample_bilinear(img, center.x + inner_r * t.cos(), center.y + inner_r * t.sin())
        }))
        .collect();
    let inner = median(&mut inner_vals)?;
    let surface = ring_median(img, center, params.max_radius + 3.0, rays)?;
    let contrast = (surface - inner).abs();
    if contrast < params.min_contrast {
        return None;
    }
    let mid = 0.5 * (inner + surface);

    let r_max = params.max_radius + 2.0;
    let hits: Vec<(f32, f32, f32)> = (0..rays)
        .filter_map(|k| {
            let t = std::f32::consts::TAU * k as f32 / rays as f32;
            let (dx, dy) = (t.cos(), t.sin());
            ray_crossing(img, center, dx, dy, mid, r_max).map(|r| (dx, dy, r))
        })
        .collect();
    if hits.len() < MIN_RAY_HITS {
        return None;
    }

    let mut radii: Vec<f32> = hits.iter().map(|h| h.2).collect();
    let r_med = median(&mut radii)?;
    if r_med < 0.5 * params.min_radius || r_med > params.max_radius + 1.0 {
        return None;
    }
    let tol = params.radius_outlier_frac * r_med;
    let inliers: Vec<Point2<f64>> = hits
        .iter()
        .filter(|(_, _, r)| (r - r_med).abs() <= tol)
        .map(|&(dx, dy, r)| {
            Point2::new((center.x + dx * r) as f64, (center.y + dy * r) as f64)
        })
        .collect();
    let confidence = inliers.len() as f32 / rays as f32;
    if confidence < params.min_edge_support {
        return None;
    }

    let origin = Point2::new(center.x as f64, center.y as f64);
    let fitted = fit_axis_aligned_ellipse(&inliers, origin).map(|first| {
        let kept: Vec<Point2<f64>> = inliers
            .iter()
            .copied()
            .filter(|p| first.residual(p) <= REFIT_RESIDUAL_PX)
            .collect();
        if kept.len() >= MIN_REFIT_POINTS && kept.len() < inliers.len() {
            fit_axis_aligned_ellipse(&kept, origin).unwrap_or(first)
        } else {
            first
        }
    });

    let hole = match fitted {
        Some(e) => Hole {
            center: Point2::new(e.cx as f32, e.cy as f32),
            width: (2.0 * e.a) as f32,
            height: (2.0 * e.b) as f32,
            confidence,
        },
        None => {
            log::debug!("ellipse fit failed at ({:.1}, {:.1}); using circle", center.x, center.y);
            Hole {
                center,
                width: 2.0 * r_med,
                height: 2.0 * r_med,
                confidence,
            }
        }
    };
    Some(hole)
}
