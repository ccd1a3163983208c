use std::cmp::Ordering;

use stampcheck_core::{GrayImageView, Point2};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::hole_measure::measure_hole;
use crate::hole_vote::find_hole_proposals;
use crate::params::HoleParams;
use crate::to_luma;
use crate::types::Hole;

/// Ranking used for hole selection: confidence descending, then leftmost,
/// then topmost center.
pub fn rank_holes(a: &Hole, b: &Hole) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.center.x.total_cmp(&b.center.x))
        .then_with(|| a.center.y.total_cmp(&b.center.y))
}

/// Rank measured holes, drop near-duplicates and keep at most `expected_count`.
pub fn select_holes(mut holes: Vec<Hole>, expected_count: usize, min_distance: f32) -> Vec<Hole> {
    holes.sort_by(rank_holes);
    let min_d2 = min_distance * min_distance;
    let mut out: Vec<Hole> = Vec::with_capacity(expected_count);
    for h in holes {
        if out.len() >= expected_count {
            break;
        }
        if out
            .iter()
            .any(|k| (k.center - h.center).norm_squared() < min_d2)
        {
            continue;
        }
        out.push(h);
    }
    out
}

/// Find up to `expected_count` holes, best first.
///
/// Fewer holes than expected is a normal outcome: the caller gets whatever was
/// found (possibly nothing) and decides what that means.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, params), fields(w = img.width, h = img.height))
)]
pub fn detect_holes(
    img: &GrayImageView<'_>,
    expected_count: usize,
    params: &HoleParams,
) -> Vec<Hole> {
    if expected_count == 0 {
        return Vec::new();
    }
    let Some(gray) = to_luma(img) else {
        return Vec::new();
    };

    let proposals = find_hole_proposals(&gray, params);
    let measured: Vec<Hole> = proposals
        .iter()
        .filter_map(|p| measure_hole(img, Point2::new(p.x, p.y), params))
        .collect();
    let selected = select_holes(measured, expected_count, params.min_center_distance);

    if selected.len() < expected_count {
        log::info!(
            "holes: found {} of {} expected ({} proposals)",
            selected.len(),
            expected_count,
            proposals.len()
        );
    } else {
        log::debug!("holes: found {}", selected.len());
    }
    selected
}
