//! In-memory bundle store

use std::collections::BTreeMap;

use super::{BundleStore, LedgerError};
use crate::types::{Bundle, BundleId, Classification};

/// In-memory store for tests and minimal deployments.
///
/// Not durable. Ids are allocated from one counter shared by both
/// classifications.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    bundles: [BTreeMap<BundleId, Bundle>; 2],
    next_id: BundleId,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self, classification: Classification) -> &BTreeMap<BundleId, Bundle> {
        &self.bundles[classification.index()]
    }
}

impl BundleStore for InMemoryStore {
    fn get_active(
        &self,
        classification: Classification,
        order_id: u64,
    ) -> Result<Option<Bundle>, LedgerError> {
        Ok(self
            .tree(classification)
            .values()
            .find(|b| b.order_id == order_id && b.is_active())
            .cloned())
    }

    fn get_all(&self, classification: Classification) -> Result<Vec<Bundle>, LedgerError> {
        Ok(self.tree(classification).values().cloned().collect())
    }

    fn get(
        &self,
        classification: Classification,
        id: BundleId,
    ) -> Result<Option<Bundle>, LedgerError> {
        Ok(self.tree(classification).get(&id).cloned())
    }

    fn add(&mut self, mut bundle: Bundle) -> Result<Bundle, LedgerError> {
        self.next_id += 1;
        bundle.id = self.next_id;
        self.bundles[bundle.classification.index()].insert(bundle.id, bundle.clone());
        Ok(bundle)
    }

    fn update(&mut self, bundle: &Bundle) -> Result<(), LedgerError> {
        let tree = &mut self.bundles[bundle.classification.index()];
        match tree.get_mut(&bundle.id) {
            Some(slot) => {
                *slot = bundle.clone();
                Ok(())
            }
            None => Err(LedgerError::NotFound {
                classification: bundle.classification,
                id: bundle.id,
            }),
        }
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}
