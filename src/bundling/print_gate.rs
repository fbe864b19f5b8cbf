//! Print eligibility and the Completed → Printed transition

use super::BundleError;
use crate::storage::BundleStore;
use crate::types::{Bundle, BundleId, BundleStatus, Classification};

/// Result of a `mark_printed` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    /// Already Printed; nothing changed
    AlreadyPrinted,
}

pub struct PrintReadinessGate;

impl PrintReadinessGate {
    /// Full Completed bundles, oldest first. Partial bundles only leave
    /// through `release_candidate`.
    pub fn printable(
        store: &dyn BundleStore,
        classification: Classification,
    ) -> Result<Vec<Bundle>, BundleError> {
        Ok(store
            .get_all(classification)?
            .into_iter()
            .filter(Bundle::is_printable)
            .collect())
    }

    /// The most recently ended Completed bundle holding pieces.
    pub fn release_candidate(
        store: &dyn BundleStore,
        classification: Classification,
    ) -> Result<Option<Bundle>, BundleError> {
        Ok(store
            .get_all(classification)?
            .into_iter()
            .filter(Bundle::is_releasable)
            .max_by_key(|b| (b.ended_at, b.id)))
    }

    /// `release_candidate` restricted to one production order.
    pub fn release_candidate_for_order(
        store: &dyn BundleStore,
        classification: Classification,
        order_id: u64,
    ) -> Result<Option<Bundle>, BundleError> {
        Ok(store
            .get_all(classification)?
            .into_iter()
            .filter(|b| b.order_id == order_id && b.is_releasable())
            .max_by_key(|b| (b.ended_at, b.id)))
    }

    /// Sole legal Completed → Printed transition. Idempotent.
    pub fn mark_printed(
        store: &mut dyn BundleStore,
        classification: Classification,
        id: BundleId,
    ) -> Result<MarkOutcome, BundleError> {
        let mut bundle = store
            .get(classification, id)?
            .ok_or(BundleError::NotFound { classification, id })?;

        match bundle.status {
            BundleStatus::Printed => Ok(MarkOutcome::AlreadyPrinted),
            BundleStatus::Active => Err(BundleError::StillActive {
                bundle_no: bundle.bundle_no,
            }),
            BundleStatus::Completed => {
                bundle.status = BundleStatus::Printed;
                store.update(&bundle)?;
                tracing::info!(%classification, bundle_no = %bundle.bundle_no, "Bundle marked printed");
                Ok(MarkOutcome::Marked)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use chrono::{Duration, Utc};

    fn add(store: &mut InMemoryStore, pieces: u32, full: bool, close_offset_secs: Option<i64>) -> Bundle {
        let now = Utc::now();
        let mut b = Bundle::open(Classification::Passed, 1, None, format!("n{pieces}"), "b".into(), now);
        b.add_pieces(pieces, 1.0);
        if let Some(off) = close_offset_secs {
            b.complete(full, now + Duration::seconds(off));
        }
        store.add(b).unwrap()
    }

    #[test]
    fn test_printable_only_full_completed() {
        let mut store = InMemoryStore::new();
        add(&mut store, 13, true, Some(0));
        add(&mut store, 4, false, Some(1));
        add(&mut store, 2, false, None);

        let printable = PrintReadinessGate::printable(&store, Classification::Passed).unwrap();
        assert_eq!(printable.len(), 1);
        assert_eq!(printable[0].piece_count, 13);
    }

    #[test]
    fn test_release_candidate_is_latest_ended() {
        let mut store = InMemoryStore::new();
        add(&mut store, 13, true, Some(5));
        let newest = add(&mut store, 4, false, Some(10));
        add(&mut store, 0, false, Some(20));

        let candidate = PrintReadinessGate::release_candidate(&store, Classification::Passed)
            .unwrap()
            .unwrap();
        assert_eq!(candidate.id, newest.id);
    }

    #[test]
    fn test_mark_printed_idempotent() {
        let mut store = InMemoryStore::new();
        let b = add(&mut store, 13, true, Some(0));

        let first = PrintReadinessGate::mark_printed(&mut store, Classification::Passed, b.id).unwrap();
        let second = PrintReadinessGate::mark_printed(&mut store, Classification::Passed, b.id).unwrap();
        assert_eq!(first, MarkOutcome::Marked);
        assert_eq!(second, MarkOutcome::AlreadyPrinted);
        assert_eq!(
            store.get(Classification::Passed, b.id).unwrap().unwrap().status,
            BundleStatus::Printed
        );
    }

    #[test]
    fn test_release_candidate_for_order_ignores_other_orders() {
        let mut store = InMemoryStore::new();
        let own = add(&mut store, 4, false, Some(0));

        let now = Utc::now();
        let mut other = Bundle::open(Classification::Passed, 2, None, "x".into(), "b2".into(), now);
        other.add_pieces(6, 1.0);
        other.complete(false, now + Duration::seconds(30));
        store.add(other).unwrap();

        let candidate =
            PrintReadinessGate::release_candidate_for_order(&store, Classification::Passed, 1)
                .unwrap()
                .unwrap();
        assert_eq!(candidate.id, own.id);
        assert!(PrintReadinessGate::release_candidate_for_order(&store, Classification::Passed, 3)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_mark_printed_rejects_active_and_missing() {
        let mut store = InMemoryStore::new();
        let active = add(&mut store, 3, false, None);

        assert!(matches!(
            PrintReadinessGate::mark_printed(&mut store, Classification::Passed, active.id),
            Err(BundleError::StillActive { .. })
        ));
        assert!(matches!(
            PrintReadinessGate::mark_printed(&mut store, Classification::Ndt, active.id),
            Err(BundleError::NotFound { .. })
        ));
    }
}
