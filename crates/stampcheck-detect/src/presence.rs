//! Part presence from ROI intensity statistics.

use stampcheck_core::{GrayImageView, Roi};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::params::PresenceParams;
use crate::types::PresenceReport;

/// Decide whether a part occupies the frame.
///
/// A part is present when the ROI mean is below `threshold` (parts are darker
/// than the empty fixture) and the ROI is not flat. Uniform frames and empty
/// ROIs are always absent.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, params), fields(w = img.width, h = img.height))
)]
pub fn detect_presence(
    img: &GrayImageView<'_>,
    threshold: f32,
    params: &PresenceParams,
) -> PresenceReport {
    let roi = Roi::inset(img.width, img.height, params.roi_inset_frac);
    if img.is_empty() || roi.is_empty() {
        return PresenceReport::absent();
    }

    let mut sum = 0u64;
    let mut lo = u8::MAX;
    let mut hi = u8::MIN;
    for y in roi.y0..roi.y1 {
        let row = &img.data[y * img.width + roi.x0..y * img.width + roi.x1];
        for &v in row {
            sum += v as u64;
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    let mean = sum as f32 / roi.area() as f32;
    let range = hi - lo;
    let present = mean < threshold && range >= params.min_contrast;
    log::debug!("presence: mean={mean:.1} range={range} present={present}");

    PresenceReport {
        present,
        mean,
        range,
    }
}
