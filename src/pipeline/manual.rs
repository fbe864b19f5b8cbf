//! Operator-driven operations: manual cut entry and manual print
//!
//! Runs concurrently with the polling loop; the ledger mutex and the print
//! lane keep the two from interleaving.

use chrono::Utc;
use tracing::info;

use super::polling_loop::BundleServices;
use crate::bundling::{BundleError, FormationReport};
use crate::printing::PrintOutcome;
use crate::types::{BundleId, Classification};

pub struct ManualDesk {
    services: BundleServices,
}

impl ManualDesk {
    pub fn new(services: BundleServices) -> Self {
        Self { services }
    }

    /// Enter `count` cuts by hand for the mill's running order.
    pub fn process_cuts(
        &self,
        mill_id: u32,
        classification: Classification,
        count: i64,
    ) -> Result<FormationReport, BundleError> {
        let delta = u32::try_from(count)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(BundleError::InvalidCount(count))?;

        let ctx = self
            .services
            .orders
            .active_context(mill_id)
            .map_err(|e| BundleError::OrderSource(format!("{e:#}")))?
            .ok_or(BundleError::NoActiveOrder(mill_id))?;

        let report = {
            let mut state = self.services.ledger.lock();
            self.services
                .engine
                .process_cuts(&mut state, classification, Some(&ctx), delta, Utc::now())?
        };

        info!(
            mill_id,
            %classification,
            pieces = report.pieces,
            completed = report.completed_full.len(),
            "Manual cuts entered"
        );
        Ok(report)
    }

    /// Print a bundle, or re-print it if it was printed before.
    pub async fn print(
        &self,
        classification: Classification,
        id: BundleId,
    ) -> Result<PrintOutcome, BundleError> {
        let outcome = self
            .services
            .station
            .print_or_reprint(&self.services.ledger, classification, id)
            .await?;

        if outcome == PrintOutcome::Rejected {
            let bundle_no = self
                .services
                .ledger
                .lock()
                .store
                .get(classification, id)?
                .map(|b| b.bundle_no)
                .unwrap_or_else(|| id.to_string());
            return Err(BundleError::PrintRejected(bundle_no));
        }
        Ok(outcome)
    }
}
