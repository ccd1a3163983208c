use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use approx::assert_abs_diff_eq;
use stampcheck::core::GrayImageView;
use stampcheck::{
    evaluate, ArtifactFormat, ConfigError, Defect, InspectError, InspectionConfig, Inspector,
    Session, SessionError, SessionOptions, SyntheticCamera, SyntheticPart, Verdict,
};
use tempfile::tempdir;

fn inspector_in(root: &Path, config: InspectionConfig) -> Inspector {
    let session = Session::open(root, "1566", "anna", config.session_options()).unwrap();
    Inspector::new(config, Arc::new(session)).unwrap()
}

fn count_with_extension(dir: &Path, ext: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some(ext))
        .count()
}

#[test]
fn good_part_passes_with_expected_measurements() {
    let dir = tempdir().unwrap();
    let inspector = inspector_in(dir.path(), InspectionConfig::default());
    let camera = SyntheticCamera::new(SyntheticPart::default());

    let result = inspector.capture_and_process(&camera, "part_1", 1).unwrap();

    assert_eq!(result.verdict, Verdict::Ok, "defects: {:?}", result.defects);
    assert!(result.reason.is_none());
    assert_eq!(result.hole_count, 4);
    assert_eq!(result.spatter_count, 0);
    assert_eq!(result.counter, 1);

    let v = result.measurements.values();
    for i in [0, 1, 2, 3, 6, 7, 8, 9] {
        assert_abs_diff_eq!(v[i], 40.0, epsilon = 1.0);
    }
    for i in [4, 5, 10, 11] {
        assert_abs_diff_eq!(v[i], 100.0, epsilon = 2.0);
    }

    assert!(result.artifact.exists());
    assert_eq!(
        result.artifact.file_name().unwrap().to_str().unwrap(),
        "OK_1566_part_1Count1_CAM1.jpg"
    );
    let log = fs::read_to_string(inspector.session().log_path()).unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(log.lines().nth(1).unwrap().starts_with("1,OK,1566,1,"));
}

#[test]
fn missing_part_reports_zero_measurements() {
    let dir = tempdir().unwrap();
    let inspector = inspector_in(dir.path(), InspectionConfig::default());
    let camera = SyntheticCamera::new(SyntheticPart {
        part_missing: true,
        ..SyntheticPart::default()
    });

    let result = inspector.capture_and_process(&camera, "empty", 2).unwrap();

    assert_eq!(result.verdict, Verdict::Nok);
    assert_eq!(result.reason, Some(Defect::PartMissing));
    assert!(result.measurements.values().iter().all(|&v| v == 0.0));
    assert!(result
        .artifact
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("NOK_1566_emptyCount1_CAM2"));
}

#[test]
fn unwelded_part_fails_on_seams() {
    let config = InspectionConfig::default();
    let img = SyntheticPart {
        no_welding: true,
        ..SyntheticPart::default()
    }
    .render();

    let (detections, classification) = evaluate(&img.view(), &config);

    assert_eq!(detections.holes.len(), 4);
    assert_eq!(classification.verdict, Verdict::Nok);
    assert!(matches!(
        classification.reason,
        Some(Defect::SeamLength { .. })
    ));
    let seams = classification
        .defects
        .iter()
        .filter(|d| matches!(d, Defect::SeamLength { .. }))
        .count();
    assert_eq!(seams, 4);
    for s in &detections.seams {
        assert!(s.length < 5.0, "{:?}", s);
    }
}

#[test]
fn spattered_part_fails_on_spatter() {
    let config = InspectionConfig::default();
    let img = SyntheticPart {
        spatter: true,
        ..SyntheticPart::default()
    }
    .render();

    let (detections, classification) = evaluate(&img.view(), &config);

    assert!(detections.spatter.count > config.tolerances.max_spatter);
    assert_eq!(classification.verdict, Verdict::Nok);
    assert!(classification
        .defects
        .iter()
        .any(|d| matches!(d, Defect::Spatter { .. })));
}

#[test]
fn oversize_hole_fails_on_diameter() {
    let config = InspectionConfig::default();
    let img = SyntheticPart {
        hole_diameters: [40.0, 50.0, 40.0, 40.0],
        ..SyntheticPart::default()
    }
    .render();

    let (_, classification) = evaluate(&img.view(), &config);

    assert_eq!(classification.verdict, Verdict::Nok);
    match classification.reason {
        Some(Defect::HoleDiameter { width, height, .. }) => {
            assert_abs_diff_eq!(width, 50.0, epsilon = 1.0);
            assert_abs_diff_eq!(height, 50.0, epsilon = 1.0);
        }
        other => panic!("unexpected reason {other:?}"),
    }
    // Top-right hole in the measurement vector.
    assert_abs_diff_eq!(classification.measurements.values()[2], 50.0, epsilon = 1.0);
}

#[test]
fn failed_capture_falls_back_to_placeholder() {
    let dir = tempdir().unwrap();
    let inspector = inspector_in(dir.path(), InspectionConfig::default());
    let camera = SyntheticCamera::failing(SyntheticPart {
        part_missing: true,
        ..SyntheticPart::default()
    });

    let result = inspector.capture_and_process(&camera, "p", 1).unwrap();

    assert_eq!(result.verdict, Verdict::Ok);
    assert!(result.artifact.exists());
}

#[test]
fn png_artifacts_carry_the_verdict_banner() {
    let dir = tempdir().unwrap();
    let mut config = InspectionConfig::default();
    config.output.format = ArtifactFormat::Png;
    let inspector = inspector_in(dir.path(), config);
    let img = SyntheticPart::default().render();

    let result = inspector.process_and_save(&img.view(), "p", 1).unwrap();

    assert_eq!(result.artifact.extension().unwrap(), "png");
    let saved = image::open(&result.artifact).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (600, 400));
    assert_eq!(saved.get_pixel(599, 1).0, [0, 170, 0]);
}

#[test]
fn malformed_buffer_is_rejected_without_side_effects() {
    let dir = tempdir().unwrap();
    let inspector = inspector_in(dir.path(), InspectionConfig::default());
    let data = vec![0u8; 50];
    let view = GrayImageView {
        width: 10,
        height: 10,
        data: &data,
    };

    let err = inspector.process_and_save(&view, "p", 1).unwrap_err();

    assert!(matches!(err, InspectError::InvalidImage { len: 50, .. }));
    assert_eq!(err.kind(), "invalid_image");
    let order_dir = inspector.session().dir();
    assert_eq!(count_with_extension(order_dir, "jpg"), 0);
    assert_eq!(inspector.statistics().unwrap().total, 0);
}

#[test]
fn closed_session_stops_inspection() {
    let dir = tempdir().unwrap();
    let inspector = inspector_in(dir.path(), InspectionConfig::default());
    inspector.session().close().unwrap();
    let img = SyntheticPart::default().render();

    let err = inspector.process_and_save(&img.view(), "p", 1).unwrap_err();

    assert!(matches!(
        err,
        InspectError::Session(SessionError::Closed { .. })
    ));
    assert_eq!(err.kind(), "session_closed");
}

#[test]
fn session_extension_must_match_output_format() {
    let dir = tempdir().unwrap();
    let session = Session::open(
        dir.path(),
        "1566",
        "anna",
        SessionOptions {
            extension: "png".to_string(),
        },
    )
    .unwrap();

    let err = Inspector::new(InspectionConfig::default(), Arc::new(session)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }));
}

#[test]
fn invalid_config_is_refused() {
    let dir = tempdir().unwrap();
    let session = Session::open(dir.path(), "1566", "anna", SessionOptions::default()).unwrap();
    let mut config = InspectionConfig::default();
    config.tolerances.hole_diameter_min = 50.0;

    let err = Inspector::new(config, Arc::new(session)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }));
}

#[test]
fn concurrent_inspections_get_unique_counters() {
    let dir = tempdir().unwrap();
    let inspector = inspector_in(dir.path(), InspectionConfig::default());
    let img = Arc::new(SyntheticPart::default().render());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let inspector = inspector.clone();
            let img = Arc::clone(&img);
            thread::spawn(move || {
                (0..2)
                    .map(|i| {
                        inspector
                            .process_and_save(&img.view(), &format!("t{t}_{i}"), 1)
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let mut counters: Vec<u64> = results.iter().map(|r| r.counter).collect();
    counters.sort_unstable();
    assert_eq!(counters, (1..=8).collect::<Vec<_>>());
    let mut rows: Vec<u64> = results.iter().map(|r| r.row).collect();
    rows.sort_unstable();
    assert_eq!(rows, (1..=8).collect::<Vec<_>>());

    let order_dir = inspector.session().dir();
    assert_eq!(count_with_extension(order_dir, "jpg"), 8);
    let log = fs::read_to_string(inspector.session().log_path()).unwrap();
    assert_eq!(log.lines().count(), 9);

    let stats = inspector.statistics().unwrap();
    assert_eq!((stats.ok, stats.total), (8, 8));
}
