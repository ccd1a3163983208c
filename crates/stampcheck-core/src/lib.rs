//! Core image types and utilities shared by the stampcheck crates.
//!
//! This crate is intentionally small. It does *not* depend on any concrete
//! image codec; callers adapt their decoded buffers into [`GrayImageView`].

mod image;
mod logger;
pub mod render;

pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView, Roi};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, parse_level, LOG_LEVEL_ENV};

pub use nalgebra::Point2;
