//! mill-bundle - pipe mill bundle formation service
//!
//! Polls the mill controller's cut counters, packs pieces into bundles and
//! releases full bundles to tag printing.
//!
//! # Usage
//!
//! ```bash
//! # Simulated controller with random cuts and a demo order
//! cargo run --release -- --simulate
//!
//! # Explicit config, faster polling
//! ./mill-bundle --config /etc/mill-bundle/plant_config.toml --interval-ms 250
//! ```
//!
//! # Environment Variables
//!
//! - `MILL_BUNDLE_CONFIG`: Path to the plant config TOML
//! - `RUST_LOG`: Logging level (default: info)
//! - `RESET_DB`: Set to "true" to wipe the bundle store on startup (for testing)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mill_bundle::acquisition::{ControllerLink, GatewayController, SimulatedController};
use mill_bundle::background::{DiskHealthCheck, HealthCheck, LinkHealthCheck, SelfHealer};
use mill_bundle::bundling::{BundleFormationEngine, ClassificationSet, Ledger, ThresholdResolver};
use mill_bundle::config::{
    self, HardwareBackend, OrderSourceKind, PlantConfig, PrinterKind, StorageBackend,
};
use mill_bundle::orders::{FileOrderSource, OrderSource, StaticOrderSource};
use mill_bundle::pipeline::{
    BundleServices, LoopSettings, LoopStats, PollingOrchestrator, SharedStats,
};
use mill_bundle::printing::{JsonlExporter, LabelPrinter, LogPrinter, PrintStation, SpoolPrinter};
use mill_bundle::storage::{BundleStore, InMemoryStore, ProcessLock, SledStore};
use mill_bundle::types::ProductionOrder;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "mill-bundle")]
#[command(about = "Pipe mill bundle formation and tag release")]
#[command(version)]
struct CliArgs {
    /// Plant config TOML (default: $MILL_BUNDLE_CONFIG, then ./plant_config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Force the simulated controller with random cuts
    #[arg(long)]
    simulate: bool,

    /// Override the polling interval in milliseconds
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Wipe the bundle store on startup.
    /// WARNING: This is destructive and cannot be undone!
    /// Can also be set via RESET_DB=true environment variable.
    #[arg(long)]
    reset_db: bool,
}

/// Random cuts per read when `--simulate` is given without a configured rate
const SIMULATE_DEFAULT_MAX_CUTS: u32 = 3;

// ============================================================================
// Database Reset
// ============================================================================

/// Check if a store reset is requested via CLI flag or environment variable.
fn should_reset_db(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    if let Ok(val) = std::env::var("RESET_DB") {
        let val_lower = val.to_lowercase();
        return val_lower == "true" || val_lower == "1" || val_lower == "yes";
    }
    false
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    PollingLoop,
    SelfHealer,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::PollingLoop => write!(f, "PollingLoop"),
            TaskName::SelfHealer => write!(f, "SelfHealer"),
        }
    }
}

// ============================================================================
// Component Construction
// ============================================================================

fn load_config(args: &CliArgs) -> Result<PlantConfig> {
    let mut config = match &args.config {
        Some(path) => PlantConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PlantConfig::load(),
    };

    if args.simulate {
        config.hardware.backend = HardwareBackend::Simulated;
        if config.hardware.simulated_max_cuts_per_read == 0 {
            config.hardware.simulated_max_cuts_per_read = SIMULATE_DEFAULT_MAX_CUTS;
        }
        if config.orders.source == OrderSourceKind::Static && config.orders.order.is_none() {
            config.orders.order = Some(demo_order(config.plant.mill_id));
        }
    }
    if let Some(ms) = args.interval_ms {
        config.polling.interval_ms = ms;
    }

    config.validate().context("Invalid plant configuration")?;
    Ok(config)
}

fn demo_order(mill_id: u32) -> ProductionOrder {
    info!("🧪 No order configured, running a demo order");
    ProductionOrder {
        id: 1,
        order_no: "SIM0001".to_string(),
        mill_id,
        pipe_grade: "API 5L B".to_string(),
        pipe_size: "4.5".to_string(),
        pipe_length: "6.0".to_string(),
        piece_weight_kg: 40.0,
        ended: false,
        defect_count: 0,
    }
}

/// Open the configured bundle store. The lock is `None` for the memory backend.
fn open_store(config: &PlantConfig, reset: bool) -> Result<(Box<dyn BundleStore>, Option<ProcessLock>)> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("💾 Bundle store: in-memory (bundles are lost on exit)");
            Ok((Box::new(InMemoryStore::new()), None))
        }
        StorageBackend::Sled => {
            let data_dir = &config.storage.data_dir;
            info!("🔒 Acquiring process lock...");
            let lock = ProcessLock::acquire(data_dir).context("Failed to acquire process lock")?;
            info!("✓ Process lock acquired");

            let path = data_dir.join("bundles.db");
            info!("💾 Opening bundle store at {}", path.display());
            let store = SledStore::open(&path)
                .with_context(|| format!("Failed to open bundle store {}", path.display()))?;

            if reset {
                warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                warn!("  RESET_DB DETECTED - WIPING ALL BUNDLES");
                warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                store.clear().context("Failed to clear bundle store")?;
            }
            Ok((Box::new(store), Some(lock)))
        }
    }
}

fn build_link(config: &PlantConfig) -> Box<dyn ControllerLink> {
    match config.hardware.backend {
        HardwareBackend::Simulated => {
            info!(
                max_cuts_per_read = config.hardware.simulated_max_cuts_per_read,
                "📥 Controller: simulated"
            );
            Box::new(
                SimulatedController::new()
                    .with_random_cuts(config.hardware.simulated_max_cuts_per_read),
            )
        }
        HardwareBackend::Gateway => {
            info!("📥 Controller: gateway at {}", config.hardware.address);
            Box::new(
                GatewayController::new(config.hardware.address.clone())
                    .with_read_timeout(Duration::from_secs(config.hardware.read_timeout_secs)),
            )
        }
    }
}

fn build_orders(config: &PlantConfig) -> Arc<dyn OrderSource> {
    match config.orders.source {
        OrderSourceKind::Static => match &config.orders.order {
            Some(order) => {
                info!(order_no = %order.order_no, pipe_size = %order.pipe_size, "📋 Orders: static");
                Arc::new(StaticOrderSource::with_active(order.clone()))
            }
            None => {
                warn!("📋 Orders: static with no order configured, cuts will be dropped");
                Arc::new(StaticOrderSource::default())
            }
        },
        OrderSourceKind::File => {
            info!("📋 Orders: {}", config.orders.path.display());
            Arc::new(FileOrderSource::new(config.orders.path.clone()))
        }
    }
}

fn build_station(config: &PlantConfig, orders: Arc<dyn OrderSource>) -> PrintStation {
    let printer: Arc<dyn LabelPrinter> = match config.printing.printer {
        PrinterKind::Log => Arc::new(LogPrinter::new()),
        PrinterKind::Spool => Arc::new(SpoolPrinter::new(config.printing.spool_dir.clone())),
    };
    info!(printer = printer.printer_name(), "🏷️  Tag printer ready");

    let station = PrintStation::new(printer, orders);
    match &config.printing.export_path {
        Some(path) => {
            info!("📤 Exporting printed tags to {}", path.display());
            station.with_exporter(Arc::new(JsonlExporter::new(path.clone())))
        }
        None => station,
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the loop finish its current tick
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!("🔒 Supervisor: Task {} stopped", task_name);
        }
    }
    Ok(())
}

async fn print_summary(stats: &SharedStats) {
    let stats = stats.read().await;
    info!("");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Session summary");
    info!("    Ticks:              {} ({} skipped, link down)", stats.ticks, stats.skipped_ticks);
    info!("    Pieces processed:   {}", stats.pieces_processed);
    info!("    Pieces dropped:     {}", stats.pieces_dropped);
    info!("    Bundles completed:  {}", stats.bundles_completed);
    info!("    Bundles printed:    {}", stats.bundles_printed);
    info!("    Acks written:       {}", stats.acks_written);
    info!("    Read failures:      {}", stats.read_failures);
    info!("    Step errors:        {}", stats.step_errors);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let plant_config = load_config(&args)?;
    config::init(plant_config);
    let cfg = config::get();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  mill-bundle - Pipe Mill Bundle Formation");
    info!("  Plant: {} | Mill: {}", cfg.plant.name, cfg.plant.mill_id);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("");

    // Storage first; the lock lives until main returns
    let (store, _process_lock) = open_store(cfg, should_reset_db(args.reset_db))?;
    let ledger = Ledger::new(store);

    let thresholds = ThresholdResolver::new(cfg.formation_chart.clone());
    info!(rows = cfg.formation_chart.len(), "📊 Formation chart loaded");
    let engine = Arc::new(BundleFormationEngine::new(
        ClassificationSet::new(&cfg.numbering.passed_class_code, &cfg.numbering.ndt_class_code),
        thresholds,
    ));

    let orders = build_orders(cfg);
    let station = Arc::new(build_station(cfg, Arc::clone(&orders)));
    let services = BundleServices {
        engine,
        ledger,
        orders,
        station,
    };

    let stats = LoopStats::shared();
    let settings = LoopSettings {
        mill_id: cfg.plant.mill_id,
        interval: Duration::from_millis(cfg.polling.interval_ms),
        passed_ack_address: cfg.hardware.passed_ack_address.clone(),
        ndt_ack_address: cfg.hardware.ndt_ack_address.clone(),
    };
    let mut orchestrator = PollingOrchestrator::new(build_link(cfg), services, settings)
        .with_stats(Arc::clone(&stats));

    let checks: Vec<Box<dyn HealthCheck>> = vec![
        Box::new(LinkHealthCheck::new(
            Arc::clone(&stats),
            Duration::from_secs(cfg.health.link_stale_secs),
        )),
        Box::new(DiskHealthCheck::new(
            cfg.storage.data_dir.clone(),
            cfg.health.min_free_disk_mb,
        )),
    ];
    let healer = SelfHealer::new(checks, Duration::from_secs(cfg.health.check_interval_secs));

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    info!("🔒 Supervisor: Initializing task monitoring");
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    let loop_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[PollingLoop] Task starting");
        orchestrator.run(loop_cancel).await;
        Ok(TaskName::PollingLoop)
    });

    let healer_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[SelfHealer] Task starting");
        healer.run(healer_cancel).await;
        Ok(TaskName::SelfHealer)
    });

    run_supervisor(&mut task_set, cancel_token).await?;

    print_summary(&stats).await;
    info!("");
    info!("✓ mill-bundle shutdown complete");
    Ok(())
}
