//! Configuration loading utilities for CLI commands

use anyhow::{Context, Result};
use infrarisk_core::config::{CliConfigOverrides, LayeredConfig};
use std::path::{Path, PathBuf};

use crate::cli::PipelineArgs;

/// Config file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "infrarisk.toml";

/// Load defaults, the config file and the environment.
///
/// An explicitly named file must exist; the default file is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<LayeredConfig> {
    let config = match explicit {
        Some(path) => LayeredConfig::with_defaults()
            .load_from_file(path)
            .with_context(|| format!("Failed to load configuration file {}", path.display()))?,
        None => LayeredConfig::with_defaults()
            .load_from_optional_file(default_config_path())
            .context("Failed to load configuration file")?,
    };
    Ok(config.load_from_env())
}

/// Load layered configuration with CLI overrides
pub fn load_config_with_overrides(explicit: Option<&Path>, args: &PipelineArgs) -> Result<LayeredConfig> {
    let mut config = load_config(explicit)?;
    config.update_from_cli(CliConfigOverrides {
        tolerance: args.tolerance,
        output_dir: args.output_dir.clone(),
        import_table: None,
        field_mapping: args.fields.clone(),
    });
    Ok(config)
}

fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}
