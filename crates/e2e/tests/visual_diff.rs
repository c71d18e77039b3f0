use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use test_case::test_case;

use cms_e2e::visual::{VisualConfig, VisualTester};
use cms_e2e::E2eError;

fn write_png(path: &Path, width: u32, height: u32, paint: impl Fn(u32, u32) -> [u8; 4]) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = RgbaImage::from_fn(width, height, |x, y| Rgba(paint(x, y)));
    img.save(path).unwrap();
    path.to_path_buf()
}

fn tester(dir: &Path, threshold: f64) -> VisualTester {
    VisualTester::new(VisualConfig {
        baseline_dir: dir.join("baselines"),
        diff_dir: dir.join("diffs"),
        threshold,
    })
    .unwrap()
}

#[test]
fn identical_screenshots_match_by_hash() {
    let dir = tempfile::tempdir().unwrap();
    let tester = tester(dir.path(), 0.5);

    let actual = write_png(&dir.path().join("shots/login/01.png"), 8, 8, |_, _| [200, 200, 200, 255]);
    tester.update_baseline(&actual, "login/01").unwrap();

    let diff = tester.compare(&actual, "login/01", None).unwrap();
    assert!(diff.matches);
    assert_eq!(diff.diff_pixels, 0);
    assert_eq!(diff.total_pixels, 64);
    assert_eq!(diff.actual_hash, diff.baseline_hash);
    assert!(diff.diff_image_path.is_none());
}

// 10x10 image, the top row changed: 10% of pixels differ
#[test_case(5.0, false ; "above threshold")]
#[test_case(10.5, true ; "just above the diff")]
#[test_case(50.0, true ; "well below threshold")]
fn changed_row_against_threshold(threshold: f64, expect_match: bool) {
    let dir = tempfile::tempdir().unwrap();
    let tester = tester(dir.path(), 0.5);

    let baseline = write_png(&dir.path().join("base.png"), 10, 10, |_, _| [0, 0, 0, 255]);
    tester.update_baseline(&baseline, "popup_dismiss/01_popup_visible").unwrap();

    let actual = write_png(&dir.path().join("actual.png"), 10, 10, |_, y| {
        if y == 0 { [255, 255, 255, 255] } else { [0, 0, 0, 255] }
    });

    let diff = tester
        .compare(&actual, "popup_dismiss/01_popup_visible", Some(threshold))
        .unwrap();
    assert_eq!(diff.diff_pixels, 10);
    assert!((diff.diff_percent - 10.0).abs() < 1e-9);
    assert_eq!(diff.matches, expect_match);

    let diff_image = diff.diff_image_path.unwrap();
    assert_eq!(diff_image, dir.path().join("diffs/popup_dismiss/01_popup_visible-diff.png"));
    assert!(diff_image.exists());
}

#[test]
fn small_color_noise_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let tester = tester(dir.path(), 0.0);

    let baseline = write_png(&dir.path().join("base.png"), 4, 4, |_, _| [100, 100, 100, 255]);
    tester.update_baseline(&baseline, "parallax/01").unwrap();
    let actual = write_png(&dir.path().join("actual.png"), 4, 4, |_, _| [103, 98, 100, 255]);

    let diff = tester.compare(&actual, "parallax/01", None).unwrap();
    assert!(diff.matches);
    assert_eq!(diff.diff_pixels, 0);
}

#[test]
fn size_change_counts_extra_area() {
    let dir = tempfile::tempdir().unwrap();
    let tester = tester(dir.path(), 0.5);

    let baseline = write_png(&dir.path().join("base.png"), 10, 10, |_, _| [0, 0, 0, 255]);
    tester.update_baseline(&baseline, "page_snapshots/01_index").unwrap();
    let actual = write_png(&dir.path().join("actual.png"), 10, 20, |_, _| [0, 0, 0, 255]);

    let diff = tester.compare(&actual, "page_snapshots/01_index", None).unwrap();
    assert_eq!(diff.total_pixels, 200);
    assert_eq!(diff.diff_pixels, 100);
    assert!(!diff.matches);
}

#[test]
fn missing_baseline_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let tester = tester(dir.path(), 0.5);
    let actual = write_png(&dir.path().join("actual.png"), 2, 2, |_, _| [0, 0, 0, 255]);

    let err = tester.compare(&actual, "logout/01", None).unwrap_err();
    assert!(matches!(err, E2eError::BaselineNotFound(_)));
}

#[test]
fn updating_from_missing_screenshot_fails() {
    let dir = tempfile::tempdir().unwrap();
    let tester = tester(dir.path(), 0.5);

    let err = tester
        .update_baseline(&dir.path().join("nope.png"), "logout/01")
        .unwrap_err();
    assert!(matches!(err, E2eError::VisualRegression(_)));
}
