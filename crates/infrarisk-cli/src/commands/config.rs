//! Config command implementation

use crate::config_loader::load_config;
use crate::output::OutputWriter;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::Tabled;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    value: String,
    source: String,
}

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
}

pub fn execute(config_path: Option<&Path>, output: &OutputWriter) -> Result<()> {
    let config = load_config(config_path)?;
    let mapping = config.field_mapping()?;

    let mut entries: BTreeMap<String, ConfigEntry> = config
        .to_inspection_map()
        .into_iter()
        .map(|(key, (value, source))| (key, ConfigEntry { value, source: format!("{:?}", source) }))
        .collect();

    // Unconfigured mapping entries are reported with their defaults
    for (canonical, source) in mapping.iter() {
        entries
            .entry(format!("field_mapping.{}", canonical))
            .or_insert_with(|| ConfigEntry { value: source.to_string(), source: "Default".to_string() });
    }

    if output.is_json() {
        output.result(&entries)?;
    } else {
        output.section("Configuration Values");
        output.table(
            entries
                .into_iter()
                .map(|(key, entry)| ConfigRow { key, value: entry.value, source: entry.source })
                .collect(),
        );
    }

    Ok(())
}
