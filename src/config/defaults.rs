//! System-wide default constants.
//!
//! Grouped by subsystem. Config fields default to these values.

// ============================================================================
// Bundle Formation
// ============================================================================

/// Pieces per bundle when the formation chart has no row for the mill.
pub const DEFAULT_PIECES_PER_BUNDLE: u32 = 13;

/// Two chart pipe sizes closer than this are the same size (inches).
pub const PIPE_SIZE_TOLERANCE: f64 = 1e-6;

/// Class code embedded in passed bundle numbers.
pub const DEFAULT_PASSED_CLASS_CODE: &str = "OK";

/// Class code embedded in NDT bundle numbers.
pub const DEFAULT_NDT_CLASS_CODE: &str = "NDT";

// ============================================================================
// Polling Loop
// ============================================================================

/// Tick interval of the polling loop (ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Controller address acknowledged after a passed "bundle done" release.
pub const DEFAULT_PASSED_ACK_ADDRESS: &str = "OK_BUNDLE_ACK";

/// Controller address acknowledged after an NDT "bundle done" release.
pub const DEFAULT_NDT_ACK_ADDRESS: &str = "NDT_BUNDLE_ACK";

// ============================================================================
// PLC Gateway
// ============================================================================

/// Default gateway endpoint.
pub const DEFAULT_GATEWAY_ADDRESS: &str = "127.0.0.1:5020";

/// TCP connect timeout for the gateway (seconds).
pub const GATEWAY_CONNECT_TIMEOUT_SECS: u64 = 3;

/// Per-request read timeout for the gateway (seconds).
///
/// Must stay well under the tick interval or a hung gateway stalls ticks.
pub const DEFAULT_GATEWAY_READ_TIMEOUT_SECS: u64 = 2;

/// TCP keepalive idle time on the gateway socket (seconds).
pub const GATEWAY_KEEPALIVE_SECS: u64 = 30;

// ============================================================================
// Health Monitoring
// ============================================================================

/// Self-healer check interval (seconds).
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// No good controller read for this long marks the link unhealthy (seconds).
pub const LINK_STALE_SECS: u64 = 30;

/// Free space below this in the data directory is a warning (MB).
pub const MIN_FREE_DISK_MB: u64 = 500;

// ============================================================================
// Paths
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "MILL_BUNDLE_CONFIG";

/// Config file looked for in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "plant_config.toml";

pub const DEFAULT_DATA_DIR: &str = "./data";

pub const DEFAULT_SPOOL_DIR: &str = "./spool";

pub const DEFAULT_ORDER_FILE: &str = "./orders.json";
