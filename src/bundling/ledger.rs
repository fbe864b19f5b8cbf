//! Shared bundle ledger
//!
//! The store plus the engine's per-classification continuity state behind
//! one mutex. Every read-modify-write sequence (formation, closure, mark
//! printed) runs with the guard held for its whole duration.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::storage::BundleStore;
use crate::types::{Classification, ContextKey};

/// Batch continuity for one classification.
#[derive(Debug, Clone, Default)]
pub struct FormationState {
    /// Context the last cuts were attributed to
    pub last_context: Option<ContextKey>,
    /// Batch id new bundles continue under
    pub current_batch: Option<String>,
    /// Set when the last full bundle filled its batch
    pub roll_batch: bool,
}

impl FormationState {
    /// Forget batch continuity so the next bundle starts a new batch.
    pub fn break_batch(&mut self) {
        self.current_batch = None;
        self.roll_batch = false;
    }
}

pub struct LedgerState {
    pub store: Box<dyn BundleStore>,
    formation: [FormationState; 2],
}

impl LedgerState {
    pub fn formation(&mut self, classification: Classification) -> &mut FormationState {
        &mut self.formation[classification.index()]
    }
}

/// Cloneable handle to the ledger
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<Mutex<LedgerState>>,
}

impl Ledger {
    pub fn new(store: Box<dyn BundleStore>) -> Self {
        tracing::info!(backend = store.backend_name(), "Bundle ledger ready");
        Self {
            inner: Arc::new(Mutex::new(LedgerState {
                store,
                formation: Default::default(),
            })),
        }
    }

    /// Lock the ledger. A poisoned lock is recovered; the store itself is
    /// only written through whole-record updates.
    pub fn lock(&self) -> MutexGuard<'_, LedgerState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Ledger lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
