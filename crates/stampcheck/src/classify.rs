//! OK/NOK decision and the twelve-value measurement vector.

use std::fmt;

use serde::{Deserialize, Serialize};
use stampcheck_detect::{Hole, HoleLayout, SeamEdge, WeldSeam};

use crate::config::ToleranceConfig;

/// Pass/fail verdict for one part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NOK")]
    Nok,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::Nok => "NOK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "OK" => Some(Verdict::Ok),
            "NOK" => Some(Verdict::Nok),
            _ => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Verdict::Ok
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A failed classifier rule. Variants are listed in precedence order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Defect {
    PartMissing,
    HoleCount { found: usize, expected: usize },
    HoleDiameter { index: usize, width: f32, height: f32 },
    SeamLength { edge: SeamEdge, length: f32 },
    Spatter { count: usize, max: usize },
}

impl Defect {
    pub fn kind(&self) -> &'static str {
        match self {
            Defect::PartMissing => "part_missing",
            Defect::HoleCount { .. } => "hole_count",
            Defect::HoleDiameter { .. } => "hole_diameter",
            Defect::SeamLength { .. } => "seam_length",
            Defect::Spatter { .. } => "spatter",
        }
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Defect::PartMissing => write!(f, "part missing"),
            Defect::HoleCount { found, expected } => {
                write!(f, "holes: {found} of {expected}")
            }
            Defect::HoleDiameter {
                index,
                width,
                height,
            } => write!(f, "hole {}: {width:.1}x{height:.1}", index + 1),
            Defect::SeamLength { edge, length } => {
                write!(f, "{} seam: {length:.1}", edge.name())
            }
            Defect::Spatter { count, max } => write!(f, "spatter: {count} > {max}"),
        }
    }
}

/// `[H1.W, H1.H, H2.W, H2.H, Top, Bottom, H3.W, H3.H, H4.W, H4.H, Left, Right]`
/// with H1..H4 = top-left, top-right, bottom-left, bottom-right.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementVector(pub [f32; 12]);

impl MeasurementVector {
    pub const LEN: usize = 12;

    pub fn zeros() -> Self {
        Self([0.0; 12])
    }

    /// Populate from a hole layout and the four seams; gaps stay `0.0`.
    pub fn from_detections(layout: &HoleLayout, seams: &[WeldSeam]) -> Self {
        let hole = |h: Option<Hole>| h.map_or((0.0, 0.0), |h| (h.width, h.height));
        let seam = |edge: SeamEdge| {
            seams
                .iter()
                .find(|s| s.edge == edge)
                .map_or(0.0, |s| s.length)
        };
        let (h1w, h1h) = hole(layout.top_left);
        let (h2w, h2h) = hole(layout.top_right);
        let (h3w, h3h) = hole(layout.bottom_left);
        let (h4w, h4h) = hole(layout.bottom_right);
        Self([
            h1w,
            h1h,
            h2w,
            h2h,
            seam(SeamEdge::Top),
            seam(SeamEdge::Bottom),
            h3w,
            h3h,
            h4w,
            h4h,
            seam(SeamEdge::Left),
            seam(SeamEdge::Right),
        ])
    }

    pub fn values(&self) -> &[f32; 12] {
        &self.0
    }
}

/// Classifier output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub verdict: Verdict,
    /// First failed rule in precedence order.
    pub reason: Option<Defect>,
    /// Every failed rule, in precedence order.
    pub defects: Vec<Defect>,
    pub measurements: MeasurementVector,
}

fn within(v: f32, lo: f32, hi: f32) -> bool {
    v >= lo && v <= hi
}

/// Apply tolerances to detector outputs.
///
/// `holes` are the detected holes in rank order; `layout` is their quadrant
/// arrangement used for the measurement vector. Bounds are inclusive.
pub fn classify(
    present: bool,
    holes: &[Hole],
    layout: &HoleLayout,
    seams: &[WeldSeam],
    spatter_count: usize,
    tol: &ToleranceConfig,
) -> Classification {
    let mut defects = Vec::new();

    if !present {
        defects.push(Defect::PartMissing);
    }
    if holes.len() != tol.expected_holes {
        defects.push(Defect::HoleCount {
            found: holes.len(),
            expected: tol.expected_holes,
        });
    }
    for (index, h) in holes.iter().enumerate() {
        let ok = within(h.width, tol.hole_diameter_min, tol.hole_diameter_max)
            && within(h.height, tol.hole_diameter_min, tol.hole_diameter_max);
        if !ok {
            defects.push(Defect::HoleDiameter {
                index,
                width: h.width,
                height: h.height,
            });
        }
    }
    for s in seams {
        if !within(s.length, tol.seam_length_min, tol.seam_length_max) {
            defects.push(Defect::SeamLength {
                edge: s.edge,
                length: s.length,
            });
        }
    }
    if spatter_count > tol.max_spatter {
        defects.push(Defect::Spatter {
            count: spatter_count,
            max: tol.max_spatter,
        });
    }

    let measurements = if present {
        MeasurementVector::from_detections(layout, seams)
    } else {
        MeasurementVector::zeros()
    };
    let verdict = if defects.is_empty() {
        Verdict::Ok
    } else {
        Verdict::Nok
    };
    Classification {
        verdict,
        reason: defects.first().cloned(),
        defects,
        measurements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn hole(x: f32, y: f32, d: f32) -> Hole {
        Hole {
            center: Point2::new(x, y),
            width: d,
            height: d,
            confidence: 1.0,
        }
    }

    fn seam(edge: SeamEdge, length: f32) -> WeldSeam {
        WeldSeam {
            edge,
            length,
            span: None,
        }
    }

    fn good_part() -> (Vec<Hole>, HoleLayout, Vec<WeldSeam>) {
        let holes = vec![
            hole(230.0, 130.0, 36.0),
            hole(370.0, 130.0, 38.0),
            hole(230.0, 270.0, 40.0),
            hole(370.0, 270.0, 42.0),
        ];
        let layout = HoleLayout {
            top_left: Some(holes[0]),
            top_right: Some(holes[1]),
            bottom_left: Some(holes[2]),
            bottom_right: Some(holes[3]),
        };
        let seams = vec![
            seam(SeamEdge::Top, 103.0),
            seam(SeamEdge::Bottom, 99.0),
            seam(SeamEdge::Left, 102.0),
            seam(SeamEdge::Right, 100.0),
        ];
        (holes, layout, seams)
    }

    #[test]
    fn in_tolerance_part_is_ok_with_exact_vector() {
        let (holes, layout, seams) = good_part();
        let c = classify(true, &holes, &layout, &seams, 0, &ToleranceConfig::default());
        assert_eq!(c.verdict, Verdict::Ok);
        assert!(c.defects.is_empty());
        assert_eq!(c.reason, None);
        assert_eq!(
            c.measurements.0,
            [36.0, 36.0, 38.0, 38.0, 103.0, 99.0, 40.0, 40.0, 42.0, 42.0, 102.0, 100.0]
        );
    }

    #[test]
    fn bounds_are_inclusive() {
        let (mut holes, mut layout, mut seams) = good_part();
        holes[0].width = 35.0;
        holes[1].height = 45.0;
        layout.top_left = Some(holes[0]);
        seams[0].length = 80.0;
        seams[1].length = 120.0;
        let c = classify(true, &holes, &layout, &seams, 5, &ToleranceConfig::default());
        assert_eq!(c.verdict, Verdict::Ok);
    }

    #[test]
    fn any_single_violation_is_nok() {
        let tol = ToleranceConfig::default();
        let (holes, layout, seams) = good_part();

        let mut h = holes.clone();
        h[2].height = 45.5;
        let c = classify(true, &h, &layout, &seams, 0, &tol);
        assert_eq!(c.verdict, Verdict::Nok);
        assert_eq!(c.reason.as_ref().map(Defect::kind), Some("hole_diameter"));

        let mut s = seams.clone();
        s[3].length = 79.9;
        let c = classify(true, &holes, &layout, &s, 0, &tol);
        assert_eq!(c.reason.as_ref().map(Defect::kind), Some("seam_length"));

        let c = classify(true, &holes, &layout, &seams, 6, &tol);
        assert_eq!(c.reason, Some(Defect::Spatter { count: 6, max: 5 }));

        let c = classify(true, &holes[..3], &layout, &seams, 0, &tol);
        assert_eq!(c.reason.as_ref().map(Defect::kind), Some("hole_count"));
    }

    #[test]
    fn precedence_reports_first_failure_and_keeps_all() {
        let (holes, layout, mut seams) = good_part();
        seams[0].length = 0.0;
        let c = classify(true, &holes[..2], &layout, &seams, 9, &ToleranceConfig::default());
        assert_eq!(c.reason.as_ref().map(Defect::kind), Some("hole_count"));
        let kinds: Vec<&str> = c.defects.iter().map(Defect::kind).collect();
        assert_eq!(kinds, vec!["hole_count", "seam_length", "spatter"]);
    }

    #[test]
    fn absent_part_zeroes_the_vector() {
        let (holes, layout, seams) = good_part();
        let c = classify(false, &holes, &layout, &seams, 0, &ToleranceConfig::default());
        assert_eq!(c.verdict, Verdict::Nok);
        assert_eq!(c.reason, Some(Defect::PartMissing));
        assert_eq!(c.measurements, MeasurementVector::zeros());
    }

    #[test]
    fn missing_holes_and_seams_read_zero() {
        let layout = HoleLayout {
            top_right: Some(hole(370.0, 130.0, 38.0)),
            ..HoleLayout::default()
        };
        let v = MeasurementVector::from_detections(&layout, &[seam(SeamEdge::Left, 0.0)]);
        assert_eq!(
            v.0,
            [0.0, 0.0, 38.0, 38.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn verdict_strings_round_trip() {
        for v in [Verdict::Ok, Verdict::Nok] {
            assert_eq!(Verdict::parse(v.as_str()), Some(v));
        }
        assert_eq!(serde_json::to_string(&Verdict::Nok).unwrap(), "\"NOK\"");
    }
}
