//! Integration tests for the infrarisk binary
//!
//! Every test runs in its own temporary directory with the in-memory store.

use serde_json::{json, Value};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn infrarisk(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_infrarisk"))
        .current_dir(dir)
        .args(args)
        .env_remove("INFRARISK_TOLERANCE")
        .env_remove("INFRARISK_OUTPUT_DIR")
        .env_remove("INFRARISK_IMPORT_TABLE")
        .env_remove("INFRARISK_SCRATCH_PREFIX")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute command")
}

fn write_fixtures(dir: &Path) {
    let roads = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "id": 1,
            "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [100.0, 0.0]]},
            "properties": {"route_code": "E6", "elementtype_code": 1, "aadt_passenger": 900, "aadt_goods": 80, "diversion_time": 12}
        }]
    });
    let zones = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "id": 4,
            "geometry": {"type": "Polygon", "coordinates": [[[40.0, -5.0], [60.0, -5.0], [60.0, 5.0], [40.0, 5.0], [40.0, -5.0]]]},
            "properties": {"processtype_id": 1, "event_frequency": 0.1, "freq_interval_plus": 0.2, "freq_interval_minus": 0.05}
        }]
    });
    std::fs::write(dir.join("roads.geojson"), roads.to_string()).unwrap();
    std::fs::write(dir.join("zones.geojson"), zones.to_string()).unwrap();
}

fn parse_stdout(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("Output should be valid JSON")
}

#[test]
fn test_overlay_writes_import_rows() {
    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());

    let output = infrarisk(
        dir.path(),
        &["--json", "overlay", "--hazard", "zones.geojson", "--element", "roads.geojson", "--output-dir", "out"],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let parsed = parse_stdout(&output);
    assert_eq!(parsed["status"], "success");
    assert_eq!(parsed["data"]["segments"], 3);
    assert_eq!(parsed["data"]["importable_rows"], 1);

    let rows: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("out/earImportTbl.json")).unwrap()).unwrap();
    assert_eq!(rows["columns"].as_array().unwrap().len(), 13);
    assert_eq!(rows["rows"].as_array().unwrap().len(), 1);
}

#[test]
fn test_run_with_memory_store() {
    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());

    let output = infrarisk(
        dir.path(),
        &[
            "--json",
            "run",
            "--name",
            "Valley",
            "--study-id",
            "12",
            "--hazard",
            "zones.geojson",
            "--element",
            "roads.geojson",
            "--output-dir",
            "out",
        ],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let parsed = parse_stdout(&output);
    assert_eq!(parsed["data"]["study_id"], 12);
    assert_eq!(parsed["data"]["imported_rows"], 1);
    assert!(dir.path().join("out/ear12_feat.geojson").exists());
}

#[test]
fn test_config_reports_sources() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("infrarisk.toml"), "tolerance = 0.25\n\n[field_mapping]\nroute_code = \"road\"\n")
        .unwrap();

    let output = infrarisk(dir.path(), &["--json", "config"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let parsed = parse_stdout(&output);
    assert_eq!(parsed["data"]["tolerance"]["value"], "0.25");
    assert_eq!(parsed["data"]["tolerance"]["source"], "File");
    assert_eq!(parsed["data"]["field_mapping.route_code"]["value"], "road");
    assert_eq!(parsed["data"]["field_mapping.element_size"]["value"], "Shape_Length");
}

#[test]
fn test_unknown_mapping_entry_fails() {
    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());

    let output = infrarisk(
        dir.path(),
        &["overlay", "--hazard", "zones.geojson", "--element", "roads.geojson", "--field", "colour=red"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("colour"));
}
