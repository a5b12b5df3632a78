use clap::{Parser, Subcommand};
use infrarisk_core::config::{parse_field_override, parse_tolerance};
use std::path::PathBuf;

/// InfraRisk - hazard/element overlay and risk import
#[derive(Parser, Debug)]
#[command(name = "infrarisk")]
#[command(about = "Split infrastructure at hazard zones and import the intersections", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Storage backend to use (memory or postgres)
    #[arg(long, global = true, default_value = "memory")]
    pub storage: StorageBackend,

    /// Configuration file (defaults to ./infrarisk.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageBackend {
    /// In-memory store (nothing is persisted)
    Memory,
    /// PostgreSQL risk database (DATABASE_URL)
    Postgres,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full study: initiate, register datasets, overlay, import
    Run(RunArgs),

    /// Overlay and project only; writes the would-be import rows as JSON
    Overlay(OverlayArgs),

    /// Show the effective configuration and where each value came from
    Config,
}

/// Overrides shared by every pipeline command
#[derive(Parser, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Override a source column: canonical=source (repeatable)
    #[arg(long = "field", value_name = "CANONICAL=SOURCE", value_parser = field_override)]
    pub fields: Vec<(String, String)>,

    /// Directory receiving the output feature set
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Length tolerance in map units
    #[arg(long, value_parser = tolerance)]
    pub tolerance: Option<f64>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Study name
    #[arg(long)]
    pub name: String,

    /// Study description
    #[arg(long)]
    pub description: Option<String>,

    /// Reuse (and reset) an existing study id
    #[arg(long)]
    pub study_id: Option<i64>,

    /// Hazard zone dataset (GeoJSON polygons)
    #[arg(long)]
    pub hazard: PathBuf,

    /// Element dataset (GeoJSON lines)
    #[arg(long)]
    pub element: PathBuf,

    /// Description stored with the hazard dataset
    #[arg(long)]
    pub hazard_description: Option<String>,

    /// Description stored with the element dataset
    #[arg(long)]
    pub element_description: Option<String>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Parser, Debug)]
pub struct OverlayArgs {
    /// Hazard zone dataset (GeoJSON polygons)
    #[arg(long)]
    pub hazard: PathBuf,

    /// Element dataset (GeoJSON lines)
    #[arg(long)]
    pub element: PathBuf,

    /// Study id written into the rows
    #[arg(long, default_value = "0")]
    pub study_id: i64,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

fn field_override(s: &str) -> Result<(String, String), String> {
    parse_field_override(s).map_err(|e| e.to_string())
}

fn tolerance(s: &str) -> Result<f64, String> {
    parse_tolerance(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "infrarisk",
            "--json",
            "run",
            "--name",
            "Valley",
            "--hazard",
            "zones.geojson",
            "--element",
            "roads.geojson",
            "--field",
            "event_frequency=freq",
            "--field",
            "route_code=road",
            "--tolerance",
            "0.5",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.storage, StorageBackend::Memory);
        let Commands::Run(args) = cli.command else { panic!("expected run") };
        assert_eq!(args.pipeline.fields.len(), 2);
        assert_eq!(args.pipeline.fields[0], ("event_frequency".to_string(), "freq".to_string()));
        assert_eq!(args.pipeline.tolerance, Some(0.5));
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let base = ["infrarisk", "overlay", "--hazard", "z.geojson", "--element", "r.geojson"];
        let with = |extra: &[&str]| {
            let mut args: Vec<&str> = base.to_vec();
            args.extend_from_slice(extra);
            Cli::try_parse_from(args)
        };
        assert!(with(&["--field", "no_equals_sign"]).is_err());
        assert!(with(&["--tolerance", "-1"]).is_err());
        assert!(with(&[]).is_ok());
    }
}
