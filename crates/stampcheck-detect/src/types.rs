use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Result of the part-presence check.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresenceReport {
    pub present: bool,
    /// Mean intensity over the region of interest.
    pub mean: f32,
    /// `max - min` intensity over the region of interest.
    pub range: u8,
}

impl PresenceReport {
    pub fn absent() -> Self {
        Self {
            present: false,
            mean: 0.0,
            range: 0,
        }
    }
}

/// A measured hole in image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hole {
    pub center: Point2<f32>,
    /// Horizontal extent (full axis length) in pixels.
    pub width: f32,
    /// Vertical extent (full axis length) in pixels.
    pub height: f32,
    /// Fraction of edge rays that agreed with the fitted rim, in `[0, 1]`.
    pub confidence: f32,
}

impl Hole {
    /// Distance from the center to the rim along the unit direction `(dx, dy)`.
    ///
    /// The rim is the axis-aligned ellipse with semi-axes `width/2`, `height/2`.
    pub fn radius_along(&self, dx: f32, dy: f32) -> f32 {
        let a = 0.5 * self.width;
        let b = 0.5 * self.height;
        if a <= 0.0 || b <= 0.0 {
            return 0.0;
        }
        let norm = (dx * dx + dy * dy).sqrt();
        if norm <= f32::EPSILON {
            return a.min(b);
        }
        let (c, s) = (dx / norm, dy / norm);
        1.0 / ((c * c) / (a * a) + (s * s) / (b * b)).sqrt()
    }
}

/// The four holes of a part arranged by image quadrant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HoleLayout {
    pub top_left: Option<Hole>,
    pub top_right: Option<Hole>,
    pub bottom_left: Option<Hole>,
    pub bottom_right: Option<Hole>,
}

impl HoleLayout {
    /// Holes in measurement order: top-left, top-right, bottom-left, bottom-right.
    pub fn ordered(&self) -> [Option<Hole>; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_left,
            self.bottom_right,
        ]
    }

    pub fn count(&self) -> usize {
        self.ordered().iter().flatten().count()
    }
}

/// Named part edge along which a weld seam is expected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeamEdge {
    Top,
    Bottom,
    Left,
    Right,
}

impl SeamEdge {
    /// All edges in reporting order.
    pub const ALL: [SeamEdge; 4] = [
        SeamEdge::Top,
        SeamEdge::Bottom,
        SeamEdge::Left,
        SeamEdge::Right,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SeamEdge::Top => "top",
            SeamEdge::Bottom => "bottom",
            SeamEdge::Left => "left",
            SeamEdge::Right => "right",
        }
    }
}

/// Measured seam along one edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeldSeam {
    pub edge: SeamEdge,
    /// Seam length in pixels; `0.0` when the edge could not be measured.
    pub length: f32,
    /// Rim-to-rim path the seam was measured on, if both holes exist.
    pub span: Option<(Point2<f32>, Point2<f32>)>,
}

impl WeldSeam {
    pub fn unmeasured(edge: SeamEdge) -> Self {
        Self {
            edge,
            length: 0.0,
            span: None,
        }
    }
}

/// One weld-spatter blob.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatterMark {
    pub center: Point2<f32>,
    /// Inclusive pixel bounding box `[x0, y0, x1, y1]`.
    pub bbox: [u32; 4],
    /// Pixel count.
    pub area: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatterReport {
    pub count: usize,
    pub marks: Vec<SpatterMark>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hole(w: f32, h: f32) -> Hole {
        Hole {
            center: Point2::new(0.0, 0.0),
            width: w,
            height: h,
            confidence: 1.0,
        }
    }

    #[test]
    fn radius_along_axes_matches_semi_axes() {
        let h = hole(40.0, 30.0);
        assert_relative_eq!(h.radius_along(1.0, 0.0), 20.0, epsilon = 1e-4);
        assert_relative_eq!(h.radius_along(0.0, -1.0), 15.0, epsilon = 1e-4);
    }

    #[test]
    fn radius_along_circle_is_constant() {
        let h = hole(36.0, 36.0);
        assert_relative_eq!(h.radius_along(1.0, 1.0), 18.0, epsilon = 1e-4);
    }

    #[test]
    fn seam_edges_serialize_lowercase() {
        let json = serde_json::to_string(&SeamEdge::Bottom).unwrap();
        assert_eq!(json, "\"bottom\"");
    }
}
