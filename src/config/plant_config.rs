//! Plant Configuration - every deployment-specific setting as a TOML value
//!
//! Each section implements `Default`, so an empty or missing file gives a
//! runnable simulated setup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::types::{FormationChartEntry, ProductionOrder};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one mill-bundle installation.
///
/// Load with `PlantConfig::load()` which searches:
/// 1. `$MILL_BUNDLE_CONFIG` env var
/// 2. `./plant_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantConfig {
    #[serde(default)]
    pub plant: PlantInfo,

    #[serde(default)]
    pub polling: PollingConfig,

    /// Controller link
    #[serde(default)]
    pub hardware: HardwareConfig,

    /// Bundle number class codes
    #[serde(default)]
    pub numbering: NumberingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub printing: PrintingConfig,

    /// Where the running production order comes from
    #[serde(default)]
    pub orders: OrdersConfig,

    #[serde(default)]
    pub health: HealthConfig,

    /// Pieces per bundle by (mill, pipe size)
    #[serde(default = "default_formation_chart")]
    pub formation_chart: Vec<FormationChartEntry>,
}

fn default_formation_chart() -> Vec<FormationChartEntry> {
    vec![FormationChartEntry::new(
        default_mill_id(),
        None,
        defaults::DEFAULT_PIECES_PER_BUNDLE,
    )]
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            plant: PlantInfo::default(),
            polling: PollingConfig::default(),
            hardware: HardwareConfig::default(),
            numbering: NumberingConfig::default(),
            storage: StorageConfig::default(),
            printing: PrintingConfig::default(),
            orders: OrdersConfig::default(),
            health: HealthConfig::default(),
            formation_chart: default_formation_chart(),
        }
    }
}

impl PlantConfig {
    /// Load configuration using the standard search order:
    /// 1. `$MILL_BUNDLE_CONFIG` environment variable
    /// 2. `./plant_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), plant = %config.plant.name, "Loaded plant config from MILL_BUNDLE_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from MILL_BUNDLE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "MILL_BUNDLE_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(plant = %config.plant.name, "Loaded plant config from ./plant_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./plant_config.toml, using defaults");
                }
            }
        }

        info!("No plant_config.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys only warn; parse and validation failures are errors.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in &super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write to a TOML file (used to seed a config for a new installation)
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
    }

    /// Validate the whole config, collecting every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.polling.interval_ms == 0 {
            errors.push("polling.interval_ms must be > 0".to_string());
        }

        let h = &self.hardware;
        if h.read_timeout_secs == 0 {
            errors.push("hardware.read_timeout_secs must be > 0".to_string());
        }
        if h.backend == HardwareBackend::Gateway && h.address.trim().is_empty() {
            errors.push("hardware.address is required when backend = \"gateway\"".to_string());
        }
        if h.passed_ack_address.trim().is_empty() || h.ndt_ack_address.trim().is_empty() {
            errors.push("hardware ack addresses must not be empty".to_string());
        }

        let n = &self.numbering;
        for (name, code) in [
            ("passed_class_code", &n.passed_class_code),
            ("ndt_class_code", &n.ndt_class_code),
        ] {
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                errors.push(format!(
                    "numbering.{name} = {code:?} must be one or more ASCII letters"
                ));
            }
        }
        if n.passed_class_code == n.ndt_class_code {
            errors.push("numbering class codes must differ".to_string());
        }

        if self.printing.printer == PrinterKind::Spool
            && self.printing.spool_dir.as_os_str().is_empty()
        {
            errors.push("printing.spool_dir is required when printer = \"spool\"".to_string());
        }
        if self.orders.source == OrderSourceKind::File && self.orders.path.as_os_str().is_empty() {
            errors.push("orders.path is required when source = \"file\"".to_string());
        }
        if self.storage.backend == StorageBackend::Sled
            && self.storage.data_dir.as_os_str().is_empty()
        {
            errors.push("storage.data_dir is required when backend = \"sled\"".to_string());
        }

        self.validate_chart(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn validate_chart(&self, errors: &mut Vec<String>) {
        let mut seen = HashSet::new();
        let mut mills: BTreeMap<u32, bool> = BTreeMap::new();

        for (i, entry) in self.formation_chart.iter().enumerate() {
            if entry.pieces_per_bundle == 0 {
                errors.push(format!("formation_chart[{i}].pieces_per_bundle must be > 0"));
            }
            if let Some(size) = entry.pipe_size {
                if !size.is_finite() || size <= 0.0 {
                    errors.push(format!(
                        "formation_chart[{i}].pipe_size must be a positive number (got {size})"
                    ));
                }
            }
            // Duplicate (mill, size) rows make resolution order-dependent
            let size_key = entry.pipe_size.map(|s| (s * 1_000.0).round() as i64);
            if entry.active && !seen.insert((entry.mill_id, size_key)) {
                errors.push(format!(
                    "formation_chart[{i}] duplicates an active row for mill {} size {:?}",
                    entry.mill_id, entry.pipe_size
                ));
            }

            let has_default = mills.entry(entry.mill_id).or_insert(false);
            if entry.active && entry.is_default() {
                *has_default = true;
            }
        }

        for (mill, has_default) in mills {
            if !has_default {
                errors.push(format!(
                    "formation_chart has no active default row (no pipe_size) for mill {mill}"
                ));
            }
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Plant Info
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantInfo {
    /// Plant name, shown in logs
    #[serde(default = "default_plant_name")]
    pub name: String,

    /// Mill this process serves
    #[serde(default = "default_mill_id")]
    pub mill_id: u32,
}

fn default_plant_name() -> String {
    "DEFAULT".to_string()
}
fn default_mill_id() -> u32 {
    1
}

impl Default for PlantInfo {
    fn default() -> Self {
        Self {
            name: default_plant_name(),
            mill_id: default_mill_id(),
        }
    }
}

// ============================================================================
// Polling
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Fixed tick interval (ms)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    defaults::DEFAULT_POLL_INTERVAL_MS
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

// ============================================================================
// Hardware
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HardwareBackend {
    #[default]
    Simulated,
    Gateway,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    #[serde(default)]
    pub backend: HardwareBackend,

    /// Gateway `host:port`
    #[serde(default = "default_gateway_address")]
    pub address: String,

    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_passed_ack")]
    pub passed_ack_address: String,

    #[serde(default = "default_ndt_ack")]
    pub ndt_ack_address: String,

    /// Upper bound of random cuts per read in simulation (0 = none)
    #[serde(default)]
    pub simulated_max_cuts_per_read: u32,
}

fn default_gateway_address() -> String {
    defaults::DEFAULT_GATEWAY_ADDRESS.to_string()
}
fn default_read_timeout_secs() -> u64 {
    defaults::DEFAULT_GATEWAY_READ_TIMEOUT_SECS
}
fn default_passed_ack() -> String {
    defaults::DEFAULT_PASSED_ACK_ADDRESS.to_string()
}
fn default_ndt_ack() -> String {
    defaults::DEFAULT_NDT_ACK_ADDRESS.to_string()
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: HardwareBackend::default(),
            address: default_gateway_address(),
            read_timeout_secs: default_read_timeout_secs(),
            passed_ack_address: default_passed_ack(),
            ndt_ack_address: default_ndt_ack(),
            simulated_max_cuts_per_read: 0,
        }
    }
}

// ============================================================================
// Numbering
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberingConfig {
    #[serde(default = "default_passed_code")]
    pub passed_class_code: String,

    #[serde(default = "default_ndt_code")]
    pub ndt_class_code: String,
}

fn default_passed_code() -> String {
    defaults::DEFAULT_PASSED_CLASS_CODE.to_string()
}
fn default_ndt_code() -> String {
    defaults::DEFAULT_NDT_CLASS_CODE.to_string()
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            passed_class_code: default_passed_code(),
            ndt_class_code: default_ndt_code(),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Holds the sled database and the process lock
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_DATA_DIR)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

// ============================================================================
// Printing
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrinterKind {
    #[default]
    Log,
    Spool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintingConfig {
    #[serde(default)]
    pub printer: PrinterKind,

    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,

    /// JSON-lines export of printed tags; disabled when unset
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_SPOOL_DIR)
}

impl Default for PrintingConfig {
    fn default() -> Self {
        Self {
            printer: PrinterKind::default(),
            spool_dir: default_spool_dir(),
            export_path: None,
        }
    }
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderSourceKind {
    #[default]
    Static,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersConfig {
    #[serde(default)]
    pub source: OrderSourceKind,

    /// Order book JSON file for `source = "file"`
    #[serde(default = "default_order_file")]
    pub path: PathBuf,

    /// Running order for `source = "static"`
    #[serde(default)]
    pub order: Option<ProductionOrder>,
}

fn default_order_file() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_ORDER_FILE)
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            source: OrderSourceKind::default(),
            path: default_order_file(),
            order: None,
        }
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    #[serde(default = "default_link_stale_secs")]
    pub link_stale_secs: u64,

    #[serde(default = "default_min_free_disk_mb")]
    pub min_free_disk_mb: u64,
}

fn default_check_interval_secs() -> u64 {
    defaults::HEALTH_CHECK_INTERVAL_SECS
}
fn default_link_stale_secs() -> u64 {
    defaults::LINK_STALE_SECS
}
fn default_min_free_disk_mb() -> u64 {
    defaults::MIN_FREE_DISK_MB
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            link_stale_secs: default_link_stale_secs(),
            min_free_disk_mb: default_min_free_disk_mb(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = PlantConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: PlantConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.polling.interval_ms, 1_000);
        assert_eq!(config.plant.mill_id, 1);
        assert_eq!(config.numbering.passed_class_code, "OK");
        assert_eq!(config.formation_chart.len(), 1);
        assert_eq!(config.formation_chart[0].pieces_per_bundle, 13);
        assert_eq!(config.hardware.backend, HardwareBackend::Simulated);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[plant]
name = "North Mill"
mill_id = 2

[hardware]
backend = "gateway"
address = "10.0.0.5:5020"

[[formation_chart]]
mill_id = 2
pieces_per_bundle = 19

[[formation_chart]]
mill_id = 2
pipe_size = 4.5
pieces_per_bundle = 37
"#;
        let config: PlantConfig = toml::from_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.plant.name, "North Mill");
        assert_eq!(config.hardware.backend, HardwareBackend::Gateway);
        assert_eq!(config.hardware.read_timeout_secs, 2);
        assert_eq!(config.formation_chart.len(), 2);
        assert!(config.formation_chart[1].active);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_requires_default_chart_row() {
        let mut config = PlantConfig::default();
        config.formation_chart = vec![FormationChartEntry::new(3, Some(4.5), 10)];
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("mill without default row must fail");
        };
        assert!(errors.iter().any(|e| e.contains("mill 3")));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = PlantConfig::default();
        config.polling.interval_ms = 0;
        config.numbering.ndt_class_code = "OK".into();
        config.formation_chart.push(FormationChartEntry::new(1, None, 0));
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        assert!(errors.iter().any(|e| e.contains("interval_ms")));
        assert!(errors.iter().any(|e| e.contains("class codes must differ")));
        assert!(errors.iter().any(|e| e.contains("pieces_per_bundle")));
        assert!(errors.iter().any(|e| e.contains("duplicates")));
    }

    #[test]
    fn test_class_code_must_be_letters() {
        let mut config = PlantConfig::default();
        config.numbering.passed_class_code = "O1".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut original = PlantConfig::default();
        original.printing.export_path = Some(PathBuf::from("/tmp/bundles.jsonl"));
        let toml_str = original.to_toml().expect("serialization should work");
        let back: PlantConfig = toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(back.printing.export_path, original.printing.export_path);
        assert_eq!(back.formation_chart, original.formation_chart);
    }
}
