//! Run command implementation

use crate::cli::{RunArgs, StorageBackend};
use crate::config_loader::load_config_with_overrides;
use crate::output::OutputWriter;
use crate::storage;
use anyhow::{Context, Result};
use infrarisk_core::models::{DatasetKind, Study, StudyId};
use infrarisk_study::{SessionReport, SessionSettings, StudySession};
use std::path::Path;
use tabled::Tabled;

#[derive(Tabled)]
struct MessageRow {
    #[tabled(rename = "Status")]
    status: i64,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn execute(
    args: RunArgs,
    backend: StorageBackend,
    config_path: Option<&Path>,
    output: &OutputWriter,
) -> Result<()> {
    let config = load_config_with_overrides(config_path, &args.pipeline)?;
    let settings = SessionSettings::from_config(&config).context("Invalid field mapping")?;

    let store = storage::open(backend, &settings.import_table).await?;
    let mut session = StudySession::new(store, settings);
    session.verify_store().await.context("Risk database is not ready for imports")?;

    let mut study = Study::new(&args.name, args.description.clone())?;
    if let Some(id) = args.study_id {
        study = study.with_id(StudyId(id));
    }

    let hazard = args.hazard.display().to_string();
    let element = args.element.display().to_string();

    // Custom descriptions need the per-dataset call
    let study_id = if args.hazard_description.is_none() && args.element_description.is_none() {
        session.initiate(study, Some(hazard.as_str()), Some(element.as_str())).await?
    } else {
        let id = session.initiate(study, None, None).await?;
        session
            .register_dataset(DatasetKind::Hazard, &hazard, args.hazard_description.as_deref())
            .await?;
        session
            .register_dataset(DatasetKind::Element, &element, args.element_description.as_deref())
            .await?;
        id
    };
    output.info(format!("Study {} initiated", study_id));

    let report = session
        .hazard_element_intersection()
        .await
        .with_context(|| format!("Study {} failed", study_id))?;

    if !report.cleanup.is_clean() {
        for (path, reason) in &report.cleanup.failed {
            output.warning(format!("Scratch artifact {} was not removed: {}", path.display(), reason));
        }
    }

    if output.is_json() {
        output.result(&report)?;
    } else {
        print_report(&report, output);
    }

    Ok(())
}

fn print_report(report: &SessionReport, output: &OutputWriter) {
    output.success(format!("Study {} finished", report.study_id));

    output.section("Overlay");
    output.kv("Segments", report.segments);
    output.kv("At risk", report.at_risk_segments);
    output.kv("Intersections", report.intersections);

    output.section("Import");
    output.kv("Rows imported", report.imported_rows);
    output.table(
        report
            .finalize_messages
            .iter()
            .map(|m| MessageRow { status: m.status, message: m.message.clone() })
            .collect(),
    );

    output.section("Output");
    output.kv("Features", report.output_path.display());
    output.kv(
        "Elapsed",
        format!("{:.1}s", (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0),
    );
}
