use stampcheck_core::Point2;

use crate::types::{Hole, HoleLayout};

/// Assign holes to image quadrants around an anchor point.
///
/// With four or more holes the anchor is their centroid; otherwise the frame
/// center is used so that a lone hole still lands in the quadrant it occupies
/// in the image. Holes are expected in rank order: when two holes fall into the
/// same quadrant the earlier one is kept.
pub fn arrange_holes(holes: &[Hole], frame_width: usize, frame_height: usize) -> HoleLayout {
    let anchor = if holes.len() >= 4 {
        let n = holes.len() as f32;
        let (sx, sy) = holes
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), h| (sx + h.center.x, sy + h.center.y));
        Point2::new(sx / n, sy / n)
    } else {
        Point2::new(0.5 * frame_width as f32, 0.5 * frame_height as f32)
    };

    let mut layout = HoleLayout::default();
    for h in holes {
        let left = h.center.x < anchor.x;
        let top = h.center.y < anchor.y;
        let slot = match (top, left) {
            (true, true) => &mut layout.top_left,
            (true, false) => &mut layout.top_right,
            (false, true) => &mut layout.bottom_left,
            (false, false) => &mut layout.bottom_right,
        };
        if slot.is_none() {
            *slot = Some(*h);
        }
    }
    layout
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hole(x: f32, y: f32) -> Hole {
        Hole {
            center: Point2::new(x, y),
            width: 40.0,
            height: 40.0,
            confidence: 1.0,
        }
    }

    #[test]
    fn four_holes_use_their_centroid() {
        // Part shifted far right of frame center.
        let holes = [
            hole(500.0, 300.0),
            hole(400.0, 100.0),
            hole(500.0, 100.0),
            hole(400.0, 300.0),
        ];
        let l = arrange_holes(&holes, 600, 400);
        assert_eq!(l.top_left.unwrap().center, Point2::new(400.0, 100.0));
        assert_eq!(l.top_right.unwrap().center, Point2::new(500.0, 100.0));
        assert_eq!(l.bottom_left.unwrap().center, Point2::new(400.0, 300.0));
        assert_eq!(l.bottom_right.unwrap().center, Point2::new(500.0, 300.0));
        assert_eq!(l.count(), 4);
    }

    #[test]
    fn few_holes_use_frame_center() {
        let l = arrange_holes(&[hole(450.0, 320.0)], 600, 400);
        assert!(l.bottom_right.is_some());
        assert_eq!(l.count(), 1);
    }

    #[test]
    fn first_hole_wins_a_shared_quadrant() {
        let l = arrange_holes(&[hole(100.0, 100.0), hole(120.0, 90.0)], 600, 400);
        assert_eq!(l.top_left.unwrap().center.x, 100.0);
        assert_eq!(l.count(), 1);
    }
}
