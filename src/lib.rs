//! mill-bundle: pipe mill bundle formation
//!
//! Polls a mill controller's cut counters, packs cut pieces into bundles per
//! production order, numbers bundles and batches, and releases full bundles
//! to tag printing.
//!
//! ## Architecture
//!
//! - **Acquisition**: controller link backends (simulated, TCP gateway)
//! - **Bundling**: counter deltas, formation engine, numbering, print gate
//! - **Pipeline**: polling orchestrator, loop controller, manual desk
//! - **Printing**: print station with printer/exporter collaborators
//! - **Storage**: bundle stores (sled, in-memory) and the process lock

pub mod acquisition;
pub mod background;
pub mod bundling;
pub mod config;
pub mod orders;
pub mod pipeline;
pub mod printing;
pub mod storage;
pub mod types;

// Re-export plant configuration
pub use config::PlantConfig;

// Re-export commonly used types
pub use types::{
    Bundle, BundleId, BundleStatus, Classification, CounterReading, EdgeFlags,
    FormationChartEntry, OrderContext, PrintData, ProductionOrder, Slit,
};

// Re-export the formation core
pub use bundling::{
    BundleError, BundleFormationEngine, CutCounterTracker, Ledger, PrintReadinessGate,
    ThresholdResolver,
};

// Re-export the loop
pub use pipeline::{BundleServices, LoopController, ManualDesk, PollingOrchestrator};
