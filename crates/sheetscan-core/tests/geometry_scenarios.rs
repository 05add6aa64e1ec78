#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use bumpalo::Bump;
use sheetscan_core::config::ScanConfig;
use sheetscan_core::error::ScanError;
use sheetscan_core::image::GrayBuffer;
use sheetscan_core::normalize;
use sheetscan_core::template::Fiducial;
use sheetscan_core::test_utils::{SheetBuilder, grid_template};

#[test]
fn test_normalize_canonical_sheet_is_near_identity() {
    let template = grid_template(2, 4, 0);
    let sheet = SheetBuilder::new(&template).build();
    let arena = Bump::new();

    let (normalized, stats) =
        normalize::normalize(&sheet.as_view(), &template, &ScanConfig::default(), &arena).unwrap();

    assert_eq!((normalized.width, normalized.height), (400, 500));
    assert_eq!(stats.num_correspondences, 4);

    // A canonical-aligned sheet should warp almost onto itself
    let diff: f64 = normalized
        .data
        .iter()
        .zip(&sheet.data)
        .map(|(&a, &b)| f64::from(a.abs_diff(b)))
        .sum::<f64>()
        / normalized.data.len() as f64;
    assert!(diff < 2.0, "mean pixel difference {diff} too high");
}

#[test]
fn test_normalize_recovers_scaled_offset_sheet() {
    let template = grid_template(2, 4, 0);
    let placed = SheetBuilder::new(&template)
        .fill(1, 2)
        .build_placed(600, 700, 1.1, 40.5, 30.25);
    let canonical = SheetBuilder::new(&template).fill(1, 2).build();
    let arena = Bump::new();

    let (normalized, _) =
        normalize::normalize(&placed.as_view(), &template, &ScanConfig::default(), &arena)
            .unwrap();

    // The filled bubble of question 1, option 2 lands back at its canonical
    // position (178, 90)
    assert!(normalized.data[90 * 400 + 178] < 100);
    // Interior reference points agree with the canonical rendering
    let probes = [(90usize, 90usize), (90, 178), (126, 134), (250, 200)];
    for (y, x) in probes {
        let a = i32::from(normalized.data[y * 400 + x]);
        let b = i32::from(canonical.data[y * 400 + x]);
        assert!(
            (a - b).abs() < 120,
            "probe ({x}, {y}) diverged: {a} vs {b}"
        );
    }
}

#[test]
fn test_blank_image_reports_zero_markers() {
    let template = grid_template(1, 4, 0);
    let blank = GrayBuffer::filled(400, 500, 245);
    let arena = Bump::new();

    let err = normalize::normalize(&blank.as_view(), &template, &ScanConfig::default(), &arena)
        .unwrap_err();
    assert_eq!(
        err,
        ScanError::InsufficientMarkers {
            found: 0,
            required: 4
        }
    );
}

#[test]
fn test_missing_corner_marker() {
    let template = grid_template(1, 4, 0);
    let sheet = SheetBuilder::new(&template).omit_fiducial(2).build();
    let arena = Bump::new();

    let err = normalize::normalize(&sheet.as_view(), &template, &ScanConfig::default(), &arena)
        .unwrap_err();
    assert_eq!(
        err,
        ScanError::InsufficientMarkers {
            found: 3,
            required: 4
        }
    );
}

#[test]
fn test_shifted_corner_marker_is_degenerate() {
    let template = grid_template(1, 4, 0);
    // A 40px shift of one corner cannot be explained by page geometry
    let sheet = SheetBuilder::new(&template)
        .offset_fiducial(0, 40.0, 0.0)
        .build();
    let arena = Bump::new();

    let err = normalize::normalize(&sheet.as_view(), &template, &ScanConfig::default(), &arena)
        .unwrap_err();
    assert!(
        matches!(err, ScanError::GeometryDegenerate { .. }),
        "expected degenerate geometry, got {err:?}"
    );
}

#[test]
fn test_auxiliary_fiducials_join_the_fit() {
    let mut template = grid_template(2, 4, 0);
    template.fiducials.push(Fiducial { center: [200.0, 250.0], size: 28.0 });
    template.fiducials.push(Fiducial { center: [200.0, 440.0], size: 28.0 });

    let sheet = SheetBuilder::new(&template).build();
    let arena = Bump::new();

    let (_, stats) =
        normalize::normalize(&sheet.as_view(), &template, &ScanConfig::default(), &arena).unwrap();
    assert_eq!(stats.num_correspondences, 6);
    assert!(!stats.rejected_outlier);
}

#[test]
fn test_shifted_auxiliary_fiducial_is_rejected() {
    let mut template = grid_template(2, 4, 0);
    template.fiducials.push(Fiducial { center: [200.0, 250.0], size: 28.0 });
    template.fiducials.push(Fiducial { center: [200.0, 440.0], size: 28.0 });

    // Shift one auxiliary marker far enough to be an outlier but close
    // enough to its projected position to still be matched
    let sheet = SheetBuilder::new(&template)
        .offset_fiducial(4, 30.0, 0.0)
        .build();
    let arena = Bump::new();

    let (normalized, stats) =
        normalize::normalize(&sheet.as_view(), &template, &ScanConfig::default(), &arena).unwrap();
    assert!(stats.rejected_outlier);
    assert_eq!((normalized.width, normalized.height), (400, 500));
}
