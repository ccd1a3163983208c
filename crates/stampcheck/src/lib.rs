//! Inspection of stamped metal parts.
//!
//! This crate provides:
//! - re-exports of the detector crates (`stampcheck::core`, `stampcheck::detect`)
//! - the OK/NOK classifier and the 12-value measurement vector
//! - annotated artifacts and per-order measurement logs
//! - an [`Inspector`] that ties one frame to one persisted record
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use stampcheck::{InspectionConfig, Inspector, Session};
//! use image::ImageReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = InspectionConfig::default();
//! config.apply_env()?;
//! let session = Arc::new(Session::open(
//!     &config.output.dir,
//!     "1566",
//!     "operator",
//!     config.session_options(),
//! )?);
//! let inspector = Inspector::new(config, session)?;
//!
//! let img = ImageReader::open("part.png")?.decode()?.to_luma8();
//! let result = inspector.process_image(&img, "part_1", 1)?;
//! println!("{} -> {}", result.verdict, result.artifact.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `stampcheck::core`: image views, sampling, rendering, logging setup.
//! - `stampcheck::detect`: presence, hole, seam and spatter detectors.
//! - [`classify`]: tolerances to verdict and defect list.
//! - [`session`]: counters, artifact naming, CSV log.
//! - [`inspector`]: end-to-end pipeline.

pub use stampcheck_core as core;
pub use stampcheck_detect as detect;

pub mod annotate;
pub mod camera;
pub mod classify;
pub mod config;
pub mod error;
mod font;
pub mod inspector;
pub mod session;

pub use annotate::annotate;
pub use camera::{ImageSource, SyntheticCamera, SyntheticPart};
pub use classify::{classify, Classification, Defect, MeasurementVector, Verdict};
pub use config::{ArtifactFormat, InspectionConfig, OutputConfig, ToleranceConfig};
pub use error::{AcquireError, ConfigError, InspectError, SessionError};
pub use inspector::{detect_all, evaluate, gray_view, Detections, InspectionResult, Inspector};
pub use session::{
    MeasurementRecord, Session, SessionOptions, SessionRegistry, SessionStats, LOG_HEADER,
};
