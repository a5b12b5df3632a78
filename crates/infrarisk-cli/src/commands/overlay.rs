//! Overlay command implementation
//!
//! Runs the geometry pipeline and projection without touching the risk
//! database, leaving the import rows in the output directory for review.

use crate::cli::OverlayArgs;
use crate::config_loader::load_config_with_overrides;
use crate::output::OutputWriter;
use anyhow::{Context, Result};
use infrarisk_core::mapping::CANONICAL_COLUMNS;
use infrarisk_core::models::{DatasetKind, InputDataset, StudyId};
use infrarisk_geo::io;
use infrarisk_geo::Environment;
use infrarisk_study::session::{prepare_import, read_inputs, IMPORT_INTERMEDIATE};
use infrarisk_study::SessionSettings;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct OverlayOutput {
    segments: usize,
    at_risk_segments: usize,
    intersections: usize,
    importable_rows: usize,
    rows_path: PathBuf,
}

pub fn execute(args: OverlayArgs, config_path: Option<&Path>, output: &OutputWriter) -> Result<()> {
    let config = load_config_with_overrides(config_path, &args.pipeline)?;
    let settings = SessionSettings::from_config(&config).context("Invalid field mapping")?;

    let element = InputDataset::new(DatasetKind::Element, args.element.display().to_string(), None)?;
    let hazard = InputDataset::new(DatasetKind::Hazard, args.hazard.display().to_string(), None)?;
    let (elements, zones) = read_inputs(&element, &hazard)?;

    let env = Environment::new(settings.tolerance);
    let prepared = prepare_import(&env, &settings.field_mapping, &elements, &zones, StudyId(args.study_id))?;

    fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("Failed to create {}", settings.output_dir.display()))?;
    let rows_path = settings.output_dir.join(format!("{}.json", IMPORT_INTERMEDIATE));
    io::write_rows(&rows_path, &CANONICAL_COLUMNS, &prepared.rows, true)?;

    let summary = OverlayOutput {
        segments: prepared.overlay.segments.len(),
        at_risk_segments: prepared.overlay.at_risk_count(),
        intersections: prepared.overlay.intersections.len(),
        importable_rows: prepared.rows.len(),
        rows_path,
    };

    if output.is_json() {
        output.result(&summary)?;
    } else {
        output.success(format!("Overlay of {} on {} done", elements.name, zones.name));
        output.kv("Segments", summary.segments);
        output.kv("At risk", summary.at_risk_segments);
        output.kv("Intersections", summary.intersections);
        output.kv("Importable rows", summary.importable_rows);
        output.kv("Rows written to", summary.rows_path.display());
    }

    Ok(())
}
