//! Bundle ledger storage
//!
//! The ledger is the single source of truth for bundle state. Backends:
//! - `InMemoryStore`: tests and the `memory` backend, lost on restart
//! - `SledStore`: durable store, one sled tree per classification
//!
//! Cut counter baselines are never persisted here; only bundles are.

pub mod lockfile;
pub mod memory;
pub mod sled_store;

pub use lockfile::ProcessLock;
pub use memory::InMemoryStore;
pub use sled_store::SledStore;

use crate::types::{Bundle, BundleId, Classification};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("bundle {classification} #{id} not found")]
    NotFound {
        classification: Classification,
        id: BundleId,
    },
}

impl From<sled::Error> for LedgerError {
    fn from(e: sled::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

/// Trait for pluggable bundle stores
///
/// Mutation takes `&mut self`; callers reach a store only through the
/// ledger mutex, which serialises every read-modify-write sequence.
pub trait BundleStore: Send {
    /// The Active bundle for an order, if one exists
    fn get_active(
        &self,
        classification: Classification,
        order_id: u64,
    ) -> Result<Option<Bundle>, LedgerError>;

    /// All bundles of a classification, oldest id first
    fn get_all(&self, classification: Classification) -> Result<Vec<Bundle>, LedgerError>;

    fn get(&self, classification: Classification, id: BundleId)
        -> Result<Option<Bundle>, LedgerError>;

    /// Insert a new bundle, assigning its id. Returns the stored record.
    fn add(&mut self, bundle: Bundle) -> Result<Bundle, LedgerError>;

    /// Overwrite an existing bundle by id
    fn update(&mut self, bundle: &Bundle) -> Result<(), LedgerError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
