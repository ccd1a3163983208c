use serde::{Deserialize, Serialize};

/// Part presence settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceParams {
    /// Fraction of the frame trimmed from every side before measuring.
    pub roi_inset_frac: f32,
    /// Minimum `max - min` intensity inside the ROI for a part to count as present.
    pub min_contrast: u8,
}

impl Default for PresenceParams {
    fn default() -> Self {
        Self {
            roi_inset_frac: 0.0,
            min_contrast: 10,
        }
    }
}

/// Hole search and measurement settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoleParams {
    /// Smallest hole radius searched for (pixels).
    pub min_radius: f32,
    /// Largest hole radius searched for (pixels).
    pub max_radius: f32,
    /// Gaussian pre-smoothing sigma.
    pub blur_sigma: f32,
    /// Gradient magnitude threshold as a fraction of the image maximum.
    pub grad_threshold: f32,
    /// Accumulator peak threshold as a fraction of the accumulator maximum.
    pub min_vote_frac: f32,
    /// Gaussian sigma applied to the vote accumulator.
    pub accum_sigma: f32,
    /// Minimum distance between two hole centers (pixels).
    pub min_center_distance: f32,
    /// Cap on accumulator peaks that get measured.
    pub max_candidates: usize,
    /// Number of rays cast when measuring a candidate rim.
    pub rays: usize,
    /// Minimum surface-minus-interior contrast (0..255).
    pub min_contrast: f32,
    /// Minimum fraction of rays that must agree on the rim.
    pub min_edge_support: f32,
    /// Allowed relative deviation of a ray radius from the median radius.
    pub radius_outlier_frac: f32,
}

impl Default for HoleParams {
    fn default() -> Self {
        Self {
            min_radius: 10.0,
            max_radius: 40.0,
            blur_sigma: 1.0,
            grad_threshold: 0.3,
            min_vote_frac: 0.3,
            accum_sigma: 2.0,
            min_center_distance: 50.0,
            max_candidates: 32,
            rays: 72,
            min_contrast: 30.0,
            min_edge_support: 0.6,
            radius_outlier_frac: 0.1,
        }
    }
}

/// Weld seam measurement settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeamParams {
    /// Half-width of the probed band across the seam path (pixels).
    pub band_half_width: f32,
    /// Extra offset beyond the band where the surface level is sampled.
    pub surface_offset: f32,
    /// Minimum deviation from the surface level for a weld sample.
    pub min_contrast: f32,
    /// Sampling step along the path (pixels).
    pub step: f32,
}

impl Default for SeamParams {
    fn default() -> Self {
        Self {
            band_half_width: 3.0,
            surface_offset: 4.0,
            min_contrast: 60.0,
            step: 0.5,
        }
    }
}

/// Which blob polarity counts as spatter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatterPolarity {
    Dark,
    Bright,
    Both,
}

/// Spatter search settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatterParams {
    /// Square structuring element radius for the top/black-hat transforms.
    pub kernel_radius: usize,
    /// Minimum transform response for a foreground pixel.
    pub min_contrast: u8,
    /// Inclusive blob area bounds (pixels).
    pub min_area: u32,
    pub max_area: u32,
    pub polarity: SpatterPolarity,
}

impl Default for SpatterParams {
    fn default() -> Self {
        Self {
            kernel_radius: 3,
            min_contrast: 80,
            min_area: 3,
            max_area: 100,
            polarity: SpatterPolarity::Dark,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let p: HoleParams = serde_json::from_str(r#"{ "max_radius": 30.0 }"#).unwrap();
        assert_eq!(p.max_radius, 30.0);
        assert_eq!(p.rays, HoleParams::default().rays);
    }

    #[test]
    fn polarity_parses_lowercase() {
        let p: SpatterParams = serde_json::from_str(r#"{ "polarity": "both" }"#).unwrap();
        assert_eq!(p.polarity, SpatterPolarity::Both);
        assert_eq!(p.max_area, 100);
    }
}
