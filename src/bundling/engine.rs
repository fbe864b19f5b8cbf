//! Bundle formation engine
//!
//! Greedy bin-packing of cut deltas into bundles of the resolved threshold,
//! with a batch layer on top. All methods take the locked `LedgerState`, so a
//! caller holding the guard gets each operation as one atomic step.

use chrono::{DateTime, Utc};

use super::classification::{ClassificationDescriptor, ClassificationSet, NumberingScheme};
use super::ledger::LedgerState;
use super::sequence::{BatchSequencer, BundleNumberGenerator};
use super::threshold::ThresholdResolver;
use crate::storage::LedgerError;
use crate::types::{Bundle, BundleId, BundleStatus, Classification, OrderContext};

/// What one `process_cuts` call did to the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormationReport {
    /// Pieces packed into bundles
    pub pieces: u32,
    /// Pieces discarded because no order was running
    pub dropped: u32,
    pub completed_full: Vec<BundleId>,
    pub closed_partial: Vec<BundleId>,
    /// Bundle left Active after the call, if any
    pub active: Option<BundleId>,
}

pub struct BundleFormationEngine {
    classes: ClassificationSet,
    thresholds: ThresholdResolver,
}

impl BundleFormationEngine {
    pub fn new(classes: ClassificationSet, thresholds: ThresholdResolver) -> Self {
        Self {
            classes,
            thresholds,
        }
    }

    pub fn descriptor(&self, classification: Classification) -> &ClassificationDescriptor {
        self.classes.get(classification)
    }

    pub fn threshold_for(&self, ctx: &OrderContext) -> u32 {
        self.thresholds
            .resolve(ctx.order.mill_id, &ctx.order.pipe_size)
    }

    // ========================================================================
    // Cut processing
    // ========================================================================

    /// Pack `delta` new cuts for the running order.
    ///
    /// Without an order context the cuts are dropped. A context change, or an
    /// ended order, first closes the running Active bundle as partial and
    /// breaks batch continuity.
    pub fn process_cuts(
        &self,
        state: &mut LedgerState,
        classification: Classification,
        ctx: Option<&OrderContext>,
        delta: u32,
        now: DateTime<Utc>,
    ) -> Result<FormationReport, LedgerError> {
        let mut report = FormationReport::default();
        if delta == 0 {
            return Ok(report);
        }

        let Some(ctx) = ctx else {
            tracing::warn!(%classification, delta, "No active production order, dropping cuts");
            report.dropped = delta;
            return Ok(report);
        };

        let key = ctx.key();
        let threshold = self.threshold_for(ctx);
        let previous = state.formation(classification).last_context;

        if let Some(prev) = previous.filter(|p| *p != key) {
            tracing::info!(
                %classification,
                from_order = prev.order_id,
                to_order = key.order_id,
                "Production context changed"
            );
            if let Some(closed) = self.close_partial(state, classification, prev.order_id, now)? {
                report.closed_partial.push(closed.id);
            }
            state.formation(classification).break_batch();
        }
        if ctx.is_ended() {
            if let Some(closed) = self.close_partial(state, classification, key.order_id, now)? {
                report.closed_partial.push(closed.id);
            }
            state.formation(classification).break_batch();
        }
        state.formation(classification).last_context = Some(key);

        let mut remaining = delta;
        while remaining > 0 {
            let mut bundle = match state.store.get_active(classification, key.order_id)? {
                Some(b) => b,
                None => self.open_bundle(state, classification, ctx, now)?,
            };

            let room = threshold.saturating_sub(bundle.piece_count);
            if room == 0 {
                // Threshold shrank under an adopted bundle
                let full = bundle.piece_count >= threshold;
                bundle.complete(full, now);
                state.store.update(&bundle)?;
                self.record_batch_progress(state, &bundle, threshold)?;
                if full {
                    report.completed_full.push(bundle.id);
                } else {
                    report.closed_partial.push(bundle.id);
                }
                continue;
            }

            let n = remaining.min(room);
            bundle.add_pieces(n, ctx.order.piece_weight_kg);
            remaining -= n;
            report.pieces += n;

            if bundle.piece_count >= threshold {
                bundle.complete(true, now);
                state.store.update(&bundle)?;
                self.record_batch_progress(state, &bundle, threshold)?;
                tracing::info!(
                    %classification,
                    bundle_no = %bundle.bundle_no,
                    batch_no = %bundle.batch_no,
                    order_id = key.order_id,
                    pieces = bundle.piece_count,
                    "Bundle full"
                );
                report.completed_full.push(bundle.id);
                continue;
            }

            if ctx.is_ended()
                && batch_sum(state, classification, &bundle.batch_no, Some(&bundle))? < threshold
            {
                bundle.complete(false, now);
                tracing::info!(
                    %classification,
                    bundle_no = %bundle.bundle_no,
                    pieces = bundle.piece_count,
                    "Order ended, closing terminal partial bundle"
                );
                report.closed_partial.push(bundle.id);
            }
            state.store.update(&bundle)?;
        }

        report.active = state
            .store
            .get_active(classification, key.order_id)?
            .map(|b| b.id);

        tracing::debug!(
            %classification,
            order_id = key.order_id,
            delta,
            full = report.completed_full.len(),
            partial = report.closed_partial.len(),
            "Cuts processed"
        );
        Ok(report)
    }

    // ========================================================================
    // Closure paths
    // ========================================================================

    /// Close an order's Active bundle as partial on the order-ended edge and
    /// break batch continuity.
    pub fn close_for_order_end(
        &self,
        state: &mut LedgerState,
        classification: Classification,
        order_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Bundle>, LedgerError> {
        let closed = self.close_partial(state, classification, order_id, now)?;
        state.formation(classification).break_batch();
        if let Some(b) = &closed {
            tracing::info!(
                %classification,
                order_id,
                bundle_no = %b.bundle_no,
                pieces = b.piece_count,
                "Order ended, closed partial bundle"
            );
        }
        Ok(closed)
    }

    /// Operator "bundle done": close the running bundle if it holds pieces.
    ///
    /// The bundle is full only if it already reached the threshold. Batch
    /// continuity follows the same rule as a full closure.
    pub fn close_active(
        &self,
        state: &mut LedgerState,
        classification: Classification,
        ctx: &OrderContext,
        now: DateTime<Utc>,
    ) -> Result<Option<Bundle>, LedgerError> {
        let Some(mut bundle) = state.store.get_active(classification, ctx.order_id())? else {
            return Ok(None);
        };
        if bundle.piece_count == 0 {
            return Ok(None);
        }

        let threshold = self.threshold_for(ctx);
        bundle.complete(bundle.piece_count >= threshold, now);
        bundle.operator_done_at = Some(now);
        state.store.update(&bundle)?;
        self.record_batch_progress(state, &bundle, threshold)?;

        tracing::info!(
            %classification,
            bundle_no = %bundle.bundle_no,
            pieces = bundle.piece_count,
            full = bundle.is_full,
            "Bundle closed by operator"
        );
        Ok(Some(bundle))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn close_partial(
        &self,
        state: &mut LedgerState,
        classification: Classification,
        order_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Bundle>, LedgerError> {
        let Some(mut bundle) = state.store.get_active(classification, order_id)? else {
            return Ok(None);
        };
        bundle.complete(false, now);
        state.store.update(&bundle)?;
        Ok(Some(bundle))
    }

    /// After a closure: decide whether the next bundle continues this batch.
    fn record_batch_progress(
        &self,
        state: &mut LedgerState,
        bundle: &Bundle,
        threshold: u32,
    ) -> Result<(), LedgerError> {
        let sum = batch_sum(state, bundle.classification, &bundle.batch_no, None)?;
        let fs = state.formation(bundle.classification);
        fs.current_batch = Some(bundle.batch_no.clone());
        fs.roll_batch = sum >= threshold;
        Ok(())
    }

    fn open_bundle(
        &self,
        state: &mut LedgerState,
        classification: Classification,
        ctx: &OrderContext,
        now: DateTime<Utc>,
    ) -> Result<Bundle, LedgerError> {
        let desc = self.classes.get(classification);
        let order_no = ctx.order.order_no.as_str();
        let all = state.store.get_all(classification)?;
        let latest_for_order = all.iter().rev().find(|b| b.order_id == ctx.order_id());

        let fs = state.formation(classification);
        let batch_no = match (&fs.current_batch, fs.roll_batch) {
            (Some(batch), false) => batch.clone(),
            (Some(batch), true) => BatchSequencer::next(desc.batch_scheme, order_no, Some(batch), now),
            (None, _) => BatchSequencer::next(
                desc.batch_scheme,
                order_no,
                latest_for_order.map(|b| b.batch_no.as_str()),
                now,
            ),
        };
        fs.current_batch = Some(batch_no.clone());
        fs.roll_batch = false;

        let previous_no = match desc.numbering_scheme {
            NumberingScheme::GlobalYear => all.last(),
            NumberingScheme::PerOrder => latest_for_order,
        }
        .map(|b| b.bundle_no.as_str());
        let bundle_no = BundleNumberGenerator::next(
            desc.numbering_scheme,
            &desc.class_code,
            order_no,
            previous_no,
            now,
        );

        let bundle = state.store.add(Bundle::open(
            classification,
            ctx.order_id(),
            ctx.slit_id(),
            bundle_no,
            batch_no,
            now,
        ))?;

        tracing::info!(
            %classification,
            bundle_no = %bundle.bundle_no,
            batch_no = %bundle.batch_no,
            order_id = bundle.order_id,
            "Opened bundle"
        );
        Ok(bundle)
    }
}

/// Pieces in non-Printed bundles of a batch. `pending` overrides the stored
/// copy of a bundle whose update has not been written yet.
fn batch_sum(
    state: &LedgerState,
    classification: Classification,
    batch_no: &str,
    pending: Option<&Bundle>,
) -> Result<u32, LedgerError> {
    let sum = state
        .store
        .get_all(classification)?
        .iter()
        .filter(|b| b.batch_no == batch_no && b.status != BundleStatus::Printed)
        .map(|b| match pending {
            Some(p) if p.id == b.id => p.piece_count,
            _ => b.piece_count,
        })
        .sum();
    Ok(sum)
}
