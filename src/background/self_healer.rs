//! Self-Healer: periodic health check loop with automatic recovery
//!
//! Monitors:
//! - Controller link: stale when no good counter read for `link_stale_secs`
//! - Disk space: free space of the data directory (sled store, spool)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pipeline::{LoopStatus, SharedStats};

/// Component health status
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    /// Running with reduced capability
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl HealthStatus {
    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded { .. } => 1,
            HealthStatus::Unhealthy { .. } => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded { reason } => write!(f, "DEGRADED: {}", reason),
            HealthStatus::Unhealthy { reason } => write!(f, "UNHEALTHY: {}", reason),
        }
    }
}

/// Action taken by a health check to heal a component
#[derive(Debug, Clone, PartialEq)]
pub enum HealAction {
    /// Recovery is already running elsewhere (e.g. the loop's reconnect)
    Delegated,
    FallbackActivated,
    NoActionNeeded,
    ManualInterventionRequired { reason: String },
}

impl std::fmt::Display for HealAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealAction::Delegated => write!(f, "delegated"),
            HealAction::FallbackActivated => write!(f, "fallback activated"),
            HealAction::NoActionNeeded => write!(f, "no action needed"),
            HealAction::ManualInterventionRequired { reason } => {
                write!(f, "manual intervention required: {}", reason)
            }
        }
    }
}

/// One monitored component. `heal()` is called only when `check()` reports
/// `Unhealthy`.
pub trait HealthCheck: Send + Sync {
    fn component_name(&self) -> &str;

    fn check(&self) -> HealthStatus;

    fn heal(&self) -> HealAction;
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_checked: Instant,
    pub last_action: Option<HealAction>,
}

/// Aggregated system health
#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub components: Vec<ComponentHealth>,
    /// Worst of all components
    pub overall: HealthStatus,
    pub check_cycles: u64,
}

impl SystemHealth {
    fn new() -> Self {
        Self {
            components: Vec::new(),
            overall: HealthStatus::Healthy,
            check_cycles: 0,
        }
    }
}

// ============================================================================
// Checks
// ============================================================================

/// Controller link freshness, read from the polling loop's stats
pub struct LinkHealthCheck {
    stats: SharedStats,
    stale_after: Duration,
}

impl LinkHealthCheck {
    pub fn new(stats: SharedStats, stale_after: Duration) -> Self {
        Self { stats, stale_after }
    }
}

impl HealthCheck for LinkHealthCheck {
    fn component_name(&self) -> &str {
        "Controller Link"
    }

    fn check(&self) -> HealthStatus {
        let Ok(stats) = self.stats.try_read() else {
            return HealthStatus::Degraded {
                reason: "Could not read loop stats (lock contention)".to_string(),
            };
        };
        if stats.status == LoopStatus::Stopped {
            return HealthStatus::Degraded {
                reason: "Polling loop stopped".to_string(),
            };
        }
        match stats.secs_since_good_read(Utc::now()) {
            Some(secs) if secs > self.stale_after.as_secs() as i64 => HealthStatus::Unhealthy {
                reason: format!("No good controller read for {secs}s"),
            },
            Some(_) => HealthStatus::Healthy,
            None => HealthStatus::Degraded {
                reason: "No controller reads yet".to_string(),
            },
        }
    }

    fn heal(&self) -> HealAction {
        // The polling loop makes one reconnect attempt per tick
        warn!("Controller link stale, polling loop keeps reconnecting");
        HealAction::Delegated
    }
}

/// Free space of the directory holding the bundle store
pub struct DiskHealthCheck {
    data_path: PathBuf,
    min_free_bytes: u64,
}

impl DiskHealthCheck {
    pub fn new(data_path: impl Into<PathBuf>, min_free_mb: u64) -> Self {
        Self {
            data_path: data_path.into(),
            min_free_bytes: min_free_mb * 1024 * 1024,
        }
    }
}

impl HealthCheck for DiskHealthCheck {
    fn component_name(&self) -> &str {
        "Disk Space"
    }

    fn check(&self) -> HealthStatus {
        match check_disk_free(&self.data_path) {
            Ok(free_bytes) if free_bytes < self.min_free_bytes => HealthStatus::Unhealthy {
                reason: format!(
                    "Only {:.0} MB free (minimum {:.0} MB)",
                    free_bytes as f64 / 1_048_576.0,
                    self.min_free_bytes as f64 / 1_048_576.0
                ),
            },
            Ok(free_bytes) if free_bytes < self.min_free_bytes * 2 => HealthStatus::Degraded {
                reason: format!(
                    "{:.0} MB free, approaching minimum",
                    free_bytes as f64 / 1_048_576.0
                ),
            },
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Degraded {
                reason: format!("Could not check disk space: {}", e),
            },
        }
    }

    fn heal(&self) -> HealAction {
        HealAction::ManualInterventionRequired {
            reason: format!("free disk space under {}", self.data_path.display()),
        }
    }
}

/// Free bytes available on the filesystem holding `path`
fn check_disk_free(path: &std::path::Path) -> Result<u64, String> {
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).map_err(|e| e.to_string())?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    let result = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };

    if result == 0 {
        let stat = unsafe { stat.assume_init() };
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    } else {
        Err(format!("statvfs failed for {}", path.display()))
    }
}

// ============================================================================
// Healer loop
// ============================================================================

pub struct SelfHealer {
    checks: Vec<Box<dyn HealthCheck>>,
    interval: Duration,
    health: Arc<RwLock<SystemHealth>>,
}

impl SelfHealer {
    pub fn new(checks: Vec<Box<dyn HealthCheck>>, interval: Duration) -> Self {
        Self {
            checks,
            interval,
            health: Arc::new(RwLock::new(SystemHealth::new())),
        }
    }

    pub fn health_handle(&self) -> Arc<RwLock<SystemHealth>> {
        self.health.clone()
    }

    /// Check every `interval` until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            checks = self.checks.len(),
            interval_secs = self.interval.as_secs(),
            "Self-healer started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            self.run_cycle().await;
        }

        info!("Self-healer stopped");
    }

    /// Run one health check cycle
    pub async fn run_cycle(&self) {
        let mut components = Vec::with_capacity(self.checks.len());
        let mut worst = HealthStatus::Healthy;

        for check in &self.checks {
            let status = check.check();
            let action = match &status {
                HealthStatus::Unhealthy { .. } => {
                    error!(
                        component = check.component_name(),
                        status = %status,
                        "Component unhealthy, attempting heal"
                    );
                    Some(check.heal())
                }
                HealthStatus::Degraded { .. } => {
                    warn!(component = check.component_name(), status = %status, "Component degraded");
                    None
                }
                HealthStatus::Healthy => {
                    debug!(component = check.component_name(), "Component healthy");
                    None
                }
            };

            if let Some(ref action) = action {
                info!(component = check.component_name(), action = %action, "Heal action taken");
            }

            if status.severity() > worst.severity() {
                worst = status.clone();
            }

            components.push(ComponentHealth {
                name: check.component_name().to_string(),
                status,
                last_checked: Instant::now(),
                last_action: action,
            });
        }

        let mut health = self.health.write().await;
        health.components = components;
        health.overall = worst;
        health.check_cycles += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::LoopStats;

    #[test]
    fn test_link_check_stale_read_is_unhealthy() {
        let stats = LoopStats::shared();
        {
            let mut s = stats.try_write().unwrap();
            s.status = LoopStatus::Running;
            s.last_good_read = Some(Utc::now() - chrono::Duration::seconds(120));
        }
        let check = LinkHealthCheck::new(stats, Duration::from_secs(30));
        assert!(matches!(check.check(), HealthStatus::Unhealthy { .. }));
        assert_eq!(check.heal(), HealAction::Delegated);
    }

    #[test]
    fn test_link_check_fresh_read_is_healthy() {
        let stats = LoopStats::shared();
        {
            let mut s = stats.try_write().unwrap();
            s.status = LoopStatus::Running;
            s.last_good_read = Some(Utc::now());
        }
        let check = LinkHealthCheck::new(stats, Duration::from_secs(30));
        assert_eq!(check.check(), HealthStatus::Healthy);
    }

    #[test]
    fn test_link_check_stopped_loop_is_degraded() {
        let check = LinkHealthCheck::new(LoopStats::shared(), Duration::from_secs(30));
        assert!(matches!(check.check(), HealthStatus::Degraded { .. }));
    }

    #[test]
    fn test_disk_check_on_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let check = DiskHealthCheck::new(dir.path(), 0);
        assert_eq!(check.check(), HealthStatus::Healthy);
    }

    #[test]
    fn test_disk_check_missing_path_is_degraded() {
        let check = DiskHealthCheck::new("/definitely/not/here", 0);
        assert!(matches!(check.check(), HealthStatus::Degraded { .. }));
    }

    #[tokio::test]
    async fn test_cycle_reports_worst_status() {
        let stats = LoopStats::shared();
        stats.write().await.status = LoopStatus::Running;
        let healer = SelfHealer::new(
            vec![Box::new(LinkHealthCheck::new(stats, Duration::from_secs(30)))],
            Duration::from_secs(30),
        );
        healer.run_cycle().await;

        let health = healer.health_handle();
        let health = health.read().await;
        assert_eq!(health.check_cycles, 1);
        assert!(matches!(health.overall, HealthStatus::Degraded { .. }));
    }
}
