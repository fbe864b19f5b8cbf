//! Bundle formation core
//!
//! Cut counter deltas flow through the formation engine into the ledger;
//! the print gate decides what leaves it.

pub mod classification;
pub mod counter;
pub mod engine;
pub mod ledger;
pub mod print_gate;
pub mod sequence;
pub mod threshold;

pub use classification::{BatchScheme, ClassificationDescriptor, ClassificationSet, NumberingScheme};
pub use counter::CutCounterTracker;
pub use engine::{BundleFormationEngine, FormationReport};
pub use ledger::{FormationState, Ledger, LedgerState};
pub use print_gate::{MarkOutcome, PrintReadinessGate};
pub use sequence::{BatchSequencer, BundleNumberGenerator};
pub use threshold::ThresholdResolver;

use crate::storage::LedgerError;
use crate::types::{BundleId, Classification};

/// Errors surfaced by bundle operations
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("bundle {classification} #{id} not found")]
    NotFound {
        classification: Classification,
        id: BundleId,
    },
    #[error("bundle {bundle_no} is still active and cannot be printed")]
    StillActive { bundle_no: String },
    #[error("no active production order on mill {0}")]
    NoActiveOrder(u32),
    #[error("cut count must be positive, got {0}")]
    InvalidCount(i64),
    #[error("order context unavailable: {0}")]
    OrderSource(String),
    #[error("printer rejected tag for bundle {0}")]
    PrintRejected(String),
    #[error("print failed: {0}")]
    Print(String),
}
