//! Detectors for stamped-part inspection.
//!
//! - [`detect_presence`]: is a part in the frame at all.
//! - [`detect_holes`]: gradient-voting circle search plus rim measurement,
//!   reporting each hole's width and height separately.
//! - [`arrange_holes`] / [`measure_seams`]: weld seam length on the four edges
//!   between neighbouring holes.
//! - [`detect_spatter`]: small blobs from black-hat/top-hat filtering.
//!
//! All detectors are pure functions of the image and their params and never
//! fail: insufficient evidence shows up in the returned data.

mod hole_measure;
mod hole_vote;
mod holes;
mod layout;
mod params;
mod presence;
mod seams;
mod spatter;
mod types;

pub use hole_measure::measure_hole;
pub use hole_vote::{find_hole_proposals, HoleProposal};
pub use holes::{detect_holes, rank_holes, select_holes};
pub use layout::arrange_holes;
pub use params::{HoleParams, PresenceParams, SeamParams, SpatterParams, SpatterPolarity};
pub use presence::detect_presence;
pub use seams::measure_seams;
pub use spatter::detect_spatter;
pub use types::{
    Hole, HoleLayout, PresenceReport, SeamEdge, SpatterMark, SpatterReport, WeldSeam,
};

use stampcheck_core::GrayImageView;

/// Copy a borrowed view into an `image` buffer for `imageproc` routines.
pub(crate) fn to_luma(img: &GrayImageView<'_>) -> Option<image::GrayImage> {
    if img.is_empty() {
        return None;
    }
    image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.to_vec())
}
