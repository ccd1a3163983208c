//! Gradient voting for hole center proposals.
//!
//! Every strong-gradient pixel votes along its gradient direction at the
//! searched radii. Rim gradients of a circular hole converge on its center, so
//! holes show up as peaks in the smoothed accumulator.

use image::{GrayImage, ImageBuffer, Luma};

use crate::params::HoleParams;

/// Accumulator peak that may be a hole center.
#[derive(Clone, Copy, Debug)]
pub struct HoleProposal {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

#[inline]
fn bilinear_add(accum: &mut [f32], w: u32, x: f32, y: f32, weight: f32) {
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    if x0 + 1 >= w {
        return;
    }
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let stride = w as usize;
    let base = y0 as usize * stride + x0 as usize;
    accum[base] += weight * (1.0 - fx) * (1.0 - fy);
    accum[base + 1] += weight * fx * (1.0 - fy);
    accum[base + stride] += weight * (1.0 - fx) * fy;
    accum[base + stride + 1] += weight * fx * fy;
}

fn vote(gray: &GrayImage, params: &HoleParams) -> Option<Vec<f32>> {
    let (w, h) = gray.dimensions();
    let gx = imageproc::gradients::horizontal_scharr(gray);
    let gy = imageproc::gradients::vertical_scharr(gray);

    let mut max_mag_sq = 0.0f32;
    for (a, b) in gx.pixels().zip(gy.pixels()) {
        let (gxv, gyv) = (a[0] as f32, b[0] as f32);
        max_mag_sq = max_mag_sq.max(gxv * gxv + gyv * gyv);
    }
    let max_mag = max_mag_sq.sqrt();
    if max_mag < 1e-6 {
        return None;
    }
    let threshold = params.grad_threshold * max_mag;

    let mut accum = vec![0.0f32; (w * h) as usize];
    let (xmax, ymax) = ((w - 1) as f32, (h - 1) as f32);
    for y in 0..h {
        for x in 0..w {
            let gxv = gx.get_pixel(x, y)[0] as f32;
            let gyv = gy.get_pixel(x, y)[0] as f32;
            let mag = (gxv * gxv + gyv * gyv).sqrt();
            if mag < threshold {
                continue;
            }
            let (dx, dy) = (gxv / mag, gyv / mag);
            for sign in [-1.0f32, 1.0] {
                let mut r = params.min_radius;
                while r <= params.max_radius {
                    let vx = x as f32 + sign * dx * r;
                    let vy = y as f32 + sign * dy * r;
                    if vx >= 0.0 && vx < xmax && vy >= 0.0 && vy < ymax {
                        bilinear_add(&mut accum, w, vx, vy, mag);
                    }
                    r += 1.0;
                }
            }
        }
    }
    Some(accum)
}

/// Peak test: greater than every neighbor within `radius`, ties go to the
/// earlier raster index. The window is clipped at the image border.
fn is_local_max(data: &[f32], w: usize, h: usize, x: usize, y: usize, radius: f32) -> bool {
    let idx = y * w + x;
    let val = data[idx];
    let r = radius.ceil() as usize;
    let r2 = radius * radius;
    for ny in y.saturating_sub(r)..=(y + r).min(h - 1) {
        for nx in x.saturating_sub(r)..=(x + r).min(w - 1) {
            if nx == x && ny == y {
                continue;
            }
            let ddx = nx as f32 - x as f32;
            let ddy = ny as f32 - y as f32;
            if ddx * ddx + ddy * ddy > r2 {
                continue;
            }
            let nidx = ny * w + nx;
            if data[nidx] > val || (data[nidx] == val && nidx < idx) {
                return false;
            }
        }
    }
    true
}

/// Hole center proposals, strongest first, at most `max_candidates`.
pub fn find_hole_proposals(gray: &GrayImage, params: &HoleParams) -> Vec<HoleProposal> {
    let (w, h) = gray.dimensions();
    if w < 4 || h < 4 || params.max_radius < params.min_radius {
        return Vec::new();
    }

    let smoothed_input;
    let source = if params.blur_sigma > 0.0 {
        smoothed_input = imageproc::filter::gaussian_blur_f32(gray, params.blur_sigma);
        &smoothed_input
    } else {
        gray
    };

    let Some(accum) = vote(source, params) else {
        return Vec::new();
    };
    let Some(accum_img) = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w, h, accum) else {
        return Vec::new();
    };
    let smoothed = if params.accum_sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(&accum_img, params.accum_sigma)
    } else {
        accum_img
    };

    let data = smoothed.as_raw();
    let max_val = data.iter().copied().fold(0.0f32, f32::max);
    if max_val < 1e-6 {
        return Vec::new();
    }
    let vote_threshold = params.min_vote_frac * max_val;
    let (wu, hu) = (w as usize, h as usize);

    let mut proposals = Vec::new();
    for y in 0..hu {
        for x in 0..wu {
            let val = data[y * wu + x];
            if val < vote_threshold {
                continue;
            }
            if !is_local_max(data, wu, hu, x, y, 1.5) {
                continue;
            }
            if !is_local_max(data, wu, hu, x, y, params.min_center_distance) {
                continue;
            }
            proposals.push(HoleProposal {
                x: x as f32,
                y: y as f32,
                score: val,
            });
        }
    }

    proposals.sort_by(|a, b| b.score.total_cmp(&a.score));
    proposals.truncate(params.max_candidates);
    log::debug!("hole voting: {} proposals", proposals.len());
    proposals
}
