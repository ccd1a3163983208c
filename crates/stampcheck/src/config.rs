//! Inspection configuration: tolerances, detector params and output settings.
//!
//! Loaded once (JSON via `serde_json`, every field defaulted), optionally
//! overridden from the environment, validated, then shared read-only.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stampcheck_detect::{HoleParams, PresenceParams, SeamParams, SpatterParams};

use crate::error::ConfigError;
use crate::session::SessionOptions;

pub const ENV_PART_THRESHOLD: &str = "STAMPCHECK_PART_THRESHOLD";
pub const ENV_MAX_SPATTER: &str = "STAMPCHECK_MAX_SPATTER";
pub const ENV_OUTPUT_DIR: &str = "STAMPCHECK_OUTPUT_DIR";

/// Pass/fail thresholds applied by the classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Parts are present when the frame mean is below this intensity.
    pub part_threshold: f32,
    pub expected_holes: usize,
    pub hole_diameter_min: f32,
    pub hole_diameter_max: f32,
    pub seam_length_min: f32,
    pub seam_length_max: f32,
    pub max_spatter: usize,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            part_threshold: 240.0,
            expected_holes: 4,
            hole_diameter_min: 35.0,
            hole_diameter_max: 45.0,
            seam_length_min: 80.0,
            seam_length_max: 120.0,
            max_spatter: 5,
        }
    }
}

/// Encoding of persisted annotated images.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Jpg,
    Png,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Jpg => "jpg",
            ArtifactFormat::Png => "png",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            ArtifactFormat::Jpg => image::ImageFormat::Jpeg,
            ArtifactFormat::Png => image::ImageFormat::Png,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory; each order gets its own subdirectory.
    pub dir: PathBuf,
    pub format: ArtifactFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            format: ArtifactFormat::Jpg,
        }
    }
}

/// Everything an [`Inspector`](crate::Inspector) needs besides the session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionConfig {
    pub tolerances: ToleranceConfig,
    pub presence: PresenceParams,
    pub holes: HoleParams,
    pub seams: SeamParams,
    pub spatter: SpatterParams,
    pub output: OutputConfig,
}

impl InspectionConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Apply `STAMPCHECK_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup(ENV_PART_THRESHOLD) {
            self.tolerances.part_threshold =
                v.trim().parse().map_err(|_| ConfigError::EnvVar {
                    name: ENV_PART_THRESHOLD,
                    value: v.clone(),
                })?;
        }
        if let Some(v) = lookup(ENV_MAX_SPATTER) {
            self.tolerances.max_spatter = v.trim().parse().map_err(|_| ConfigError::EnvVar {
                name: ENV_MAX_SPATTER,
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup(ENV_OUTPUT_DIR) {
            if v.trim().is_empty() {
                return Err(ConfigError::EnvVar {
                    name: ENV_OUTPUT_DIR,
                    value: v,
                });
            }
            self.output.dir = PathBuf::from(v);
        }
        Ok(())
    }

    /// Every problem with this config, empty when it is usable.
    pub fn issues(&self) -> Vec<String> {
        let t = &self.tolerances;
        let mut issues = Vec::new();
        if !(t.part_threshold > 0.0 && t.part_threshold <= 255.0) {
            issues.push(format!(
                "part threshold {} outside (0, 255]",
                t.part_threshold
            ));
        }
        if t.expected_holes == 0 {
            issues.push("expected hole count must be at least 1".to_string());
        }
        if !(t.hole_diameter_min < t.hole_diameter_max) {
            issues.push(format!(
                "hole diameter range [{}, {}] is empty",
                t.hole_diameter_min, t.hole_diameter_max
            ));
        }
        if !(t.seam_length_min < t.seam_length_max) {
            issues.push(format!(
                "seam length range [{}, {}] is empty",
                t.seam_length_min, t.seam_length_max
            ));
        }
        if !(self.holes.min_radius > 0.0 && self.holes.min_radius < self.holes.max_radius) {
            issues.push(format!(
                "hole search radius range [{}, {}] is invalid",
                self.holes.min_radius, self.holes.max_radius
            ));
        }
        if self.spatter.min_area > self.spatter.max_area {
            issues.push(format!(
                "spatter area range [{}, {}] is empty",
                self.spatter.min_area, self.spatter.max_area
            ));
        }
        issues
    }

    /// Session settings that name artifacts after [`OutputConfig::format`].
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            extension: self.output.format.extension().to_string(),
        }
    }

    /// `Ok` when [`issues`](Self::issues) is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let issues = self.issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { issues })
        }
    }
}
