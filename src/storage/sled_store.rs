//! Durable bundle store on sled
//!
//! One tree per classification, keyed by big-endian bundle id so iteration
//! order matches allocation order. Values are JSON.

use std::path::Path;

use super::{BundleStore, LedgerError};
use crate::types::{Bundle, BundleId, Classification};

// ============================================================================
// Storage Structure
// ============================================================================

/// Sled-backed bundle store
pub struct SledStore {
    db: sled::Db,
    passed: sled::Tree,
    ndt: sled::Tree,
}

impl SledStore {
    /// Open or create the bundle database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        let passed = db.open_tree("bundles_ok")?;
        let ndt = db.open_tree("bundles_ndt")?;

        tracing::info!(
            path = %path_ref.display(),
            passed = passed.len(),
            ndt = ndt.len(),
            "Bundle store opened"
        );

        Ok(Self { db, passed, ndt })
    }

    /// Remove every stored bundle (the `--reset-db` path)
    pub fn clear(&self) -> Result<(), LedgerError> {
        self.passed.clear()?;
        self.ndt.clear()?;
        self.db.flush()?;
        Ok(())
    }

    fn tree(&self, classification: Classification) -> &sled::Tree {
        match classification {
            Classification::Passed => &self.passed,
            Classification::Ndt => &self.ndt,
        }
    }

    fn decode(value: &[u8]) -> Result<Bundle, LedgerError> {
        Ok(serde_json::from_slice(value)?)
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl BundleStore for SledStore {
    fn get_active(
        &self,
        classification: Classification,
        order_id: u64,
    ) -> Result<Option<Bundle>, LedgerError> {
        for item in self.tree(classification).iter().rev() {
            let (_key, value) = item?;
            let bundle = Self::decode(&value)?;
            if bundle.order_id == order_id && bundle.is_active() {
                return Ok(Some(bundle));
            }
        }
        Ok(None)
    }

    fn get_all(&self, classification: Classification) -> Result<Vec<Bundle>, LedgerError> {
        let mut bundles = Vec::new();
        for item in self.tree(classification).iter() {
            let (_key, value) = item?;
            match Self::decode(&value) {
                Ok(b) => bundles.push(b),
                Err(e) => {
                    tracing::warn!(%classification, error = %e, "Skipping undecodable bundle record");
                }
            }
        }
        Ok(bundles)
    }

    fn get(
        &self,
        classification: Classification,
        id: BundleId,
    ) -> Result<Option<Bundle>, LedgerError> {
        match self.tree(classification).get(id.to_be_bytes())? {
            Some(value) => Ok(Some(Self::decode(&value)?)),
            None => Ok(None),
        }
    }

    fn add(&mut self, mut bundle: Bundle) -> Result<Bundle, LedgerError> {
        // generate_id starts at 0; keep 0 as "unassigned"
        bundle.id = self.db.generate_id()? + 1;
        let value = serde_json::to_vec(&bundle)?;
        self.tree(bundle.classification)
            .insert(bundle.id.to_be_bytes(), value)?;
        self.db.flush()?;
        Ok(bundle)
    }

    fn update(&mut self, bundle: &Bundle) -> Result<(), LedgerError> {
        let tree = self.tree(bundle.classification);
        let key = bundle.id.to_be_bytes();
        if !tree.contains_key(key)? {
            return Err(LedgerError::NotFound {
                classification: bundle.classification,
                id: bundle.id,
            });
        }
        tree.insert(key, serde_json::to_vec(bundle)?)?;
        self.db.flush()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}
