use std::fs;
use std::path::Path;

use bustap_core::{CaptureReport, ReplayScript, run_replay};

fn fixture_dir(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("replay")
        .join(name)
}

fn load_expected_report(name: &str) -> CaptureReport {
    let expected_path = fixture_dir(name).join("expected_report.json");
    let expected_json = fs::read_to_string(&expected_path).expect("read expected_report.json");
    serde_json::from_str(&expected_json).expect("parse expected report")
}

fn run_golden(name: &str) {
    let script_json =
        fs::read_to_string(fixture_dir(name).join("script.json")).expect("read script.json");
    let script: ReplayScript = serde_json::from_str(&script_json).expect("parse script");
    let expected = load_expected_report(name);

    let mut actual = run_replay(&script).expect("replay script");
    actual.generated_at = expected.generated_at.clone();
    actual.tool.version = expected.tool.version.clone();

    let actual_value = serde_json::to_value(actual).expect("serialize actual");
    let expected_value = serde_json::to_value(expected).expect("serialize expected");

    assert_eq!(actual_value, expected_value, "golden mismatch in {name}");
}

#[test]
fn golden_basic() {
    run_golden("basic");
}

#[test]
fn golden_overrun() {
    run_golden("overrun");
}

#[test]
fn golden_overrun_marks_dropped_record() {
    let report = load_expected_report("overrun");
    assert!(report.stats.overrun);
    assert_eq!(report.stats.records_dropped, 1);
    assert_eq!(report.records[1].kind, "overrun");
}
