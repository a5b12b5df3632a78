use crate::error::{InfraRiskError, Result};
use crate::mapping::FieldMapping;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default length epsilon for crossing detection and duplicate comparison
pub const DEFAULT_TOLERANCE: f64 = 0.001;

/// Default durable import table
pub const DEFAULT_IMPORT_TABLE: &str = "cmrT_ImportIntersectionTable";

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for an InfraRisk run
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub tolerance: ConfigValue<f64>,
    pub output_dir: ConfigValue<PathBuf>,
    pub import_table: ConfigValue<String>,
    pub scratch_prefix: ConfigValue<String>,
    /// Canonical column -> source column overrides, merged across layers
    pub field_mapping: BTreeMap<String, ConfigValue<String>>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            tolerance: ConfigValue::new(DEFAULT_TOLERANCE, ConfigSource::Default),
            output_dir: ConfigValue::new(PathBuf::from("."), ConfigSource::Default),
            import_table: ConfigValue::new(DEFAULT_IMPORT_TABLE.to_string(), ConfigSource::Default),
            scratch_prefix: ConfigValue::new("cmr_".to_string(), ConfigSource::Default),
            field_mapping: BTreeMap::new(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| InfraRiskError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| InfraRiskError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(tolerance) = file_config.tolerance {
            validate_tolerance(tolerance)?;
            self.tolerance.update(tolerance, ConfigSource::File);
        }

        if let Some(output_dir) = file_config.output_dir {
            self.output_dir.update(output_dir, ConfigSource::File);
        }

        if let Some(import_table) = file_config.import_table {
            validate_identifier("import_table", &import_table)?;
            self.import_table.update(import_table, ConfigSource::File);
        }

        if let Some(prefix) = file_config.scratch_prefix {
            self.scratch_prefix.update(prefix, ConfigSource::File);
        }

        for (canonical, source) in file_config.field_mapping.unwrap_or_default() {
            self.set_field(canonical, source, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load the file if it exists, otherwise keep the current layers
    pub fn load_from_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        if path.as_ref().exists() {
            self.load_from_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        // INFRARISK_TOLERANCE
        if let Ok(tolerance_str) = env::var("INFRARISK_TOLERANCE") {
            match parse_tolerance(&tolerance_str) {
                Ok(tolerance) => self.tolerance.update(tolerance, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid INFRARISK_TOLERANCE value '{}': expected a positive number",
                    tolerance_str
                ),
            }
        }

        // INFRARISK_OUTPUT_DIR
        if let Ok(output_dir) = env::var("INFRARISK_OUTPUT_DIR") {
            self.output_dir.update(PathBuf::from(output_dir), ConfigSource::Environment);
        }

        // INFRARISK_IMPORT_TABLE
        if let Ok(table) = env::var("INFRARISK_IMPORT_TABLE") {
            match validate_identifier("import_table", &table) {
                Ok(()) => self.import_table.update(table, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid INFRARISK_IMPORT_TABLE value '{}': expected a plain SQL identifier",
                    table
                ),
            }
        }

        // INFRARISK_SCRATCH_PREFIX
        if let Ok(prefix) = env::var("INFRARISK_SCRATCH_PREFIX") {
            self.scratch_prefix.update(prefix, ConfigSource::Environment);
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        if let Some(tolerance) = overrides.tolerance {
            self.tolerance.update(tolerance, ConfigSource::Cli);
        }

        if let Some(output_dir) = overrides.output_dir {
            self.output_dir.update(output_dir, ConfigSource::Cli);
        }

        if let Some(import_table) = overrides.import_table {
            self.import_table.update(import_table, ConfigSource::Cli);
        }

        for (canonical, source) in overrides.field_mapping {
            self.set_field(canonical, source, ConfigSource::Cli);
        }
    }

    fn set_field(&mut self, canonical: String, source: String, from: ConfigSource) {
        match self.field_mapping.get_mut(&canonical) {
            Some(existing) => existing.update(source, from),
            None => {
                self.field_mapping.insert(canonical, ConfigValue::new(source, from));
            }
        }
    }

    /// Field mapping for a run: defaults plus every configured override
    pub fn field_mapping(&self) -> Result<FieldMapping> {
        let overrides: BTreeMap<String, String> = self
            .field_mapping
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        FieldMapping::default().with_overrides(overrides.iter())
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert("tolerance".to_string(), (self.tolerance.value.to_string(), self.tolerance.source));

        map.insert(
            "output_dir".to_string(),
            (self.output_dir.value.display().to_string(), self.output_dir.source),
        );

        map.insert(
            "import_table".to_string(),
            (self.import_table.value.clone(), self.import_table.source),
        );

        map.insert(
            "scratch_prefix".to_string(),
            (self.scratch_prefix.value.clone(), self.scratch_prefix.source),
        );

        for (canonical, value) in &self.field_mapping {
            map.insert(format!("field_mapping.{}", canonical), (value.value.clone(), value.source));
        }

        map
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    tolerance: Option<f64>,
    output_dir: Option<PathBuf>,
    import_table: Option<String>,
    scratch_prefix: Option<String>,
    field_mapping: Option<BTreeMap<String, String>>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub tolerance: Option<f64>,
    pub output_dir: Option<PathBuf>,
    pub import_table: Option<String>,
    pub field_mapping: Vec<(String, String)>,
}

/// Parse a length tolerance
pub fn parse_tolerance(s: &str) -> Result<f64> {
    let value: f64 = s.trim().parse().map_err(|_| InfraRiskError::ConfigInvalid {
        key: "tolerance".to_string(),
        reason: format!("Invalid tolerance: {}", s),
    })?;
    validate_tolerance(value)?;
    Ok(value)
}

fn validate_tolerance(value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(InfraRiskError::ConfigInvalid {
            key: "tolerance".to_string(),
            reason: format!("must be a positive length, got {}", value),
        })
    }
}

/// Parse a `canonical=source` field mapping override
pub fn parse_field_override(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((canonical, source)) if !canonical.trim().is_empty() && !source.trim().is_empty() => {
            Ok((canonical.trim().to_string(), source.trim().to_string()))
        }
        _ => Err(InfraRiskError::ConfigInvalid {
            key: "field_mapping".to_string(),
            reason: format!("expected canonical=source, got '{}'", s),
        }),
    }
}

/// Accept only plain SQL identifiers; table and procedure names are
/// interpolated into statements and cannot be bound.
pub fn validate_identifier(key: &str, value: &str) -> Result<()> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(InfraRiskError::ConfigInvalid {
            key: key.to_string(),
            reason: format!("'{}' is not a plain SQL identifier", value),
        })
    }
}
