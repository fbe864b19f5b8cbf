//! Plant Configuration Module
//!
//! Per-installation configuration loaded from TOML: which mill this process
//! serves, how it reaches the controller, where bundles are stored, how tags
//! are printed, and the formation chart.
//!
//! ## Loading Order
//!
//! 1. `MILL_BUNDLE_CONFIG` environment variable (path to TOML file)
//! 2. `plant_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup; the binary then hands plain values
//! to each component:
//!
//! ```ignore
//! config::init(PlantConfig::load());
//! let interval = config::get().polling.interval_ms;
//! ```

mod plant_config;
pub mod defaults;
pub mod validation;

pub use plant_config::*;

use std::sync::OnceLock;

/// Global plant configuration, initialized once at startup.
static PLANT_CONFIG: OnceLock<PlantConfig> = OnceLock::new();

/// Initialize the global plant configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: PlantConfig) {
    if PLANT_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global plant configuration.
///
/// Panics if `init()` has not been called; that is a startup bug.
pub fn get() -> &'static PlantConfig {
    PLANT_CONFIG
        .get()
        .expect("config::get() called before config::init()")
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    PLANT_CONFIG.get().is_some()
}
