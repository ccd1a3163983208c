//! End-to-end inspection: detect, classify, annotate, persist.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use stampcheck_core::{GrayImage, GrayImageView};
use stampcheck_detect::{
    arrange_holes, detect_holes, detect_presence, detect_spatter, measure_seams, Hole, HoleLayout,
    PresenceReport, SpatterReport, WeldSeam,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::annotate::annotate;
use crate::camera::ImageSource;
use crate::classify::{classify, Classification, Defect, MeasurementVector, Verdict};
use crate::config::InspectionConfig;
use crate::error::{ConfigError, InspectError, SessionError};
use crate::session::{RecordDraft, Session, SessionStats};

/// Raw detector outputs for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    pub presence: PresenceReport,
    /// Holes in rank order.
    pub holes: Vec<Hole>,
    pub layout: HoleLayout,
    pub seams: [WeldSeam; 4],
    pub spatter: SpatterReport,
}

/// What the caller gets back from one persisted inspection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectionResult {
    pub verdict: Verdict,
    pub reason: Option<Defect>,
    pub defects: Vec<Defect>,
    pub measurements: MeasurementVector,
    pub counter: u64,
    /// Row number in the order's log.
    pub row: u64,
    pub artifact: PathBuf,
    pub timestamp: DateTime<Local>,
    pub part: String,
    pub cam_id: u32,
    pub hole_count: usize,
    pub spatter_count: usize,
}

/// Convert an `image::GrayImage` into the lightweight core view type.
pub fn gray_view(img: &image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Run all detectors. Presence and spatter run alongside the hole search;
/// seams follow the holes they hang from.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, config), fields(w = img.width, h = img.height))
)]
pub fn detect_all(img: &GrayImageView<'_>, config: &InspectionConfig) -> Detections {
    let tol = &config.tolerances;
    let ((presence, spatter), (holes, layout, seams)) = rayon::join(
        || {
            rayon::join(
                || detect_presence(img, tol.part_threshold, &config.presence),
                || detect_spatter(img, &config.spatter),
            )
        },
        || {
            let holes = detect_holes(img, tol.expected_holes, &config.holes);
            let layout = arrange_holes(&holes, img.width, img.height);
            let seams = measure_seams(img, &layout, &config.seams);
            (holes, layout, seams)
        },
    );
    Detections {
        presence,
        holes,
        layout,
        seams,
        spatter,
    }
}

/// Detection plus classification, without side effects.
pub fn evaluate(img: &GrayImageView<'_>, config: &InspectionConfig) -> (Detections, Classification) {
    let d = detect_all(img, config);
    let c = classify(
        d.presence.present,
        &d.holes,
        &d.layout,
        &d.seams,
        d.spatter.count,
        &config.tolerances,
    );
    (d, c)
}

/// Drives inspections of one order.
#[derive(Debug, Clone)]
pub struct Inspector {
    config: Arc<InspectionConfig>,
    session: Arc<Session>,
}

impl Inspector {
    /// Validates the configuration before any inspection can run. The
    /// session must name artifacts with the configured format's extension.
    pub fn new(config: InspectionConfig, session: Arc<Session>) -> Result<Self, ConfigError> {
        config.validate()?;
        let ext = config.output.format.extension();
        if !session.extension().eq_ignore_ascii_case(ext) {
            return Err(ConfigError::Invalid {
                issues: vec![format!(
                    "session writes .{} artifacts but output.format is {ext}",
                    session.extension()
                )],
            });
        }
        Ok(Self {
            config: Arc::new(config),
            session,
        })
    }

    pub fn config(&self) -> &InspectionConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Inspect `img`, persist the annotated artifact and append the log row.
    ///
    /// Resource failures leave neither an artifact nor a log row behind.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, img), fields(order = self.session.order()))
    )]
    pub fn process_and_save(
        &self,
        img: &GrayImageView<'_>,
        part: &str,
        cam_id: u32,
    ) -> Result<InspectionResult, InspectError> {
        if img.width.checked_mul(img.height) != Some(img.data.len()) || img.is_empty() {
            return Err(InspectError::InvalidImage {
                width: img.width,
                height: img.height,
                len: img.data.len(),
            });
        }
        if !self.session.is_open() {
            return Err(SessionError::Closed {
                order: self.session.order().to_string(),
            }
            .into());
        }

        let (detections, classification) = evaluate(img, &self.config);
        let overlay = annotate(img, &detections, &classification);

        let format = self.config.output.format.image_format();
        let mut encoded = Vec::new();
        DynamicImage::ImageRgb8(overlay).write_to(&mut Cursor::new(&mut encoded), format)?;

        let draft = RecordDraft {
            verdict: classification.verdict,
            part: part.to_string(),
            cam_id,
            timestamp: Local::now(),
            values: classification.measurements,
        };
        let committed = self.session.commit(&draft, &encoded)?;

        match &classification.reason {
            None => log::info!("part {part} (counter {}): OK", committed.record.counter),
            Some(reason) => log::warn!(
                "part {part} (counter {}): NOK, {reason}",
                committed.record.counter
            ),
        }

        Ok(InspectionResult {
            verdict: classification.verdict,
            reason: classification.reason,
            defects: classification.defects,
            measurements: classification.measurements,
            counter: committed.record.counter,
            row: committed.record.number,
            artifact: committed.artifact,
            timestamp: committed.record.timestamp,
            part: part.to_string(),
            cam_id,
            hole_count: detections.holes.len(),
            spatter_count: detections.spatter.count,
        })
    }

    /// [`process_and_save`](Self::process_and_save) for an `image` buffer.
    pub fn process_image(
        &self,
        img: &image::GrayImage,
        part: &str,
        cam_id: u32,
    ) -> Result<InspectionResult, InspectError> {
        self.process_and_save(&gray_view(img), part, cam_id)
    }

    /// Capture a frame and inspect it. A failed capture is logged and the
    /// source's placeholder frame is inspected instead.
    pub fn capture_and_process(
        &self,
        source: &dyn ImageSource,
        part: &str,
        cam_id: u32,
    ) -> Result<InspectionResult, InspectError> {
        let frame: GrayImage = match source.capture() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("capture failed for part {part} on CAM{cam_id}: {e}; using placeholder");
                source.placeholder()
            }
        };
        self.process_and_save(&frame.view(), part, cam_id)
    }

    pub fn statistics(&self) -> Result<SessionStats, SessionError> {
        self.session.statistics()
    }
}
