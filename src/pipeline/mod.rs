//! Polling pipeline
//!
//! ```text
//! controller link ──► CutCounterTracker ──► BundleFormationEngine ──► ledger
//!        │                                                             │
//!        └── edge flags ──► close / release ──► PrintStation ◄─────────┘
//!                                │
//!                                └──► acknowledgment write
//! ```

mod controller;
mod edge;
mod manual;
mod polling_loop;
mod state;

pub use controller::LoopController;
pub use edge::{Edge, EdgeDetector};
pub use manual::ManualDesk;
pub use polling_loop::{BundleServices, LoopSettings, PollingOrchestrator, TickReport};
pub use state::*;
