//! Print station: one lane for every tag job
//!
//! Loop prints and manual prints both go through `PrintStation`, whose lane
//! mutex keeps jobs from interleaving. The ledger lock is only held for the
//! status re-check and the mark-printed step, never across the printer call.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::{BundleExporter, LabelPrinter};
use crate::bundling::{BundleError, Ledger, MarkOutcome, PrintReadinessGate};
use crate::orders::OrderSource;
use crate::types::{Bundle, BundleId, BundleStatus, Classification, PrintData};

/// What happened to a print request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintOutcome {
    /// Printed and moved to Printed
    Printed,
    /// Already Printed; tag printed again as a reprint
    Reprinted,
    /// Another job printed it first; nothing done
    AlreadyPrinted,
    /// Printer declined the job; bundle left Completed
    Rejected,
}

pub struct PrintStation {
    printer: Arc<dyn LabelPrinter>,
    exporter: Option<Arc<dyn BundleExporter>>,
    orders: Arc<dyn OrderSource>,
    lane: Mutex<()>,
}

impl PrintStation {
    pub fn new(printer: Arc<dyn LabelPrinter>, orders: Arc<dyn OrderSource>) -> Self {
        Self {
            printer,
            exporter: None,
            orders,
            lane: Mutex::new(()),
        }
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn BundleExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Print a Completed bundle and mark it Printed.
    ///
    /// The status is re-read under the lane, so two callers racing for the
    /// same bundle print it once.
    pub async fn print_and_mark(
        &self,
        ledger: &Ledger,
        classification: Classification,
        id: BundleId,
    ) -> Result<PrintOutcome, BundleError> {
        let _lane = self.lane.lock().await;

        let bundle = Self::load(ledger, classification, id)?;
        match bundle.status {
            BundleStatus::Printed => return Ok(PrintOutcome::AlreadyPrinted),
            BundleStatus::Active => {
                return Err(BundleError::StillActive {
                    bundle_no: bundle.bundle_no,
                })
            }
            BundleStatus::Completed => {}
        }

        if !self.emit(&bundle, false).await? {
            return Ok(PrintOutcome::Rejected);
        }

        let mut state = ledger.lock();
        match PrintReadinessGate::mark_printed(state.store.as_mut(), classification, id)? {
            MarkOutcome::Marked => Ok(PrintOutcome::Printed),
            MarkOutcome::AlreadyPrinted => Ok(PrintOutcome::AlreadyPrinted),
        }
    }

    /// Operator print: prints Completed bundles normally and re-prints
    /// Printed ones without touching their status.
    pub async fn print_or_reprint(
        &self,
        ledger: &Ledger,
        classification: Classification,
        id: BundleId,
    ) -> Result<PrintOutcome, BundleError> {
        let status = Self::load(ledger, classification, id)?.status;
        if status != BundleStatus::Printed {
            return self.print_and_mark(ledger, classification, id).await;
        }

        let _lane = self.lane.lock().await;
        let bundle = Self::load(ledger, classification, id)?;
        if self.emit(&bundle, true).await? {
            Ok(PrintOutcome::Reprinted)
        } else {
            Ok(PrintOutcome::Rejected)
        }
    }

    fn load(ledger: &Ledger, classification: Classification, id: BundleId) -> Result<Bundle, BundleError> {
        let state = ledger.lock();
        state
            .store
            .get(classification, id)?
            .ok_or(BundleError::NotFound { classification, id })
    }

    /// Project, print, export. Export failures are logged, not returned.
    async fn emit(&self, bundle: &Bundle, is_reprint: bool) -> Result<bool, BundleError> {
        let order = match self.orders.order_by_id(bundle.order_id) {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(order_id = bundle.order_id, error = %e, "Order lookup failed, printing without order details");
                None
            }
        };
        let data = PrintData::project(bundle, order.as_ref(), is_reprint);

        let accepted = self
            .printer
            .print_tag(&data)
            .await
            .map_err(|e| BundleError::Print(format!("{e:#}")))?;
        if !accepted {
            tracing::warn!(
                printer = self.printer.printer_name(),
                bundle_no = %bundle.bundle_no,
                "Printer declined tag"
            );
            return Ok(false);
        }

        if let Some(exporter) = &self.exporter {
            if let Err(e) = exporter.export(&data).await {
                tracing::warn!(bundle_no = %bundle.bundle_no, error = %e, "Export failed");
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::StaticOrderSource;
    use crate::printing::LogPrinter;
    use crate::storage::InMemoryStore;
    use crate::types::ProductionOrder;
    use chrono::Utc;

    struct DecliningPrinter;

    #[async_trait::async_trait]
    impl LabelPrinter for DecliningPrinter {
        async fn print_tag(&self, _data: &PrintData) -> anyhow::Result<bool> {
            Ok(false)
        }

        fn printer_name(&self) -> &'static str {
            "declining"
        }
    }

    fn orders() -> Arc<dyn OrderSource> {
        Arc::new(StaticOrderSource::with_active(ProductionOrder {
            id: 1,
            order_no: "W1".into(),
            mill_id: 1,
            pipe_grade: "X52".into(),
            pipe_size: "4.5".into(),
            pipe_length: "12m".into(),
            piece_weight_kg: 0.0,
            ended: false,
            defect_count: 0,
        }))
    }

    fn ledger_with(status_full: Option<bool>) -> (Ledger, BundleId) {
        let ledger = Ledger::new(Box::new(InMemoryStore::new()));
        let mut b = Bundle::open(Classification::Passed, 1, None, "261OK0001".into(), "W1_2610001".into(), Utc::now());
        b.add_pieces(13, 0.0);
        if let Some(full) = status_full {
            b.complete(full, Utc::now());
        }
        let id = ledger.lock().store.add(b).unwrap().id;
        (ledger, id)
    }

    #[tokio::test]
    async fn test_print_and_mark_then_reprint() {
        let printer = Arc::new(LogPrinter::new());
        let station = PrintStation::new(printer.clone(), orders());
        let (ledger, id) = ledger_with(Some(true));

        let first = station.print_and_mark(&ledger, Classification::Passed, id).await.unwrap();
        assert_eq!(first, PrintOutcome::Printed);
        let again = station.print_and_mark(&ledger, Classification::Passed, id).await.unwrap();
        assert_eq!(again, PrintOutcome::AlreadyPrinted);
        let reprint = station.print_or_reprint(&ledger, Classification::Passed, id).await.unwrap();
        assert_eq!(reprint, PrintOutcome::Reprinted);

        let tags = printer.printed();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].order_no, "W1");
        assert_eq!(tags[0].pipe_grade, "X52");
        assert!(!tags[0].is_reprint);
        assert!(tags[1].is_reprint);
    }

    #[tokio::test]
    async fn test_active_bundle_refused() {
        let station = PrintStation::new(Arc::new(LogPrinter::new()), orders());
        let (ledger, id) = ledger_with(None);
        assert!(matches!(
            station.print_and_mark(&ledger, Classification::Passed, id).await,
            Err(BundleError::StillActive { .. })
        ));
    }

    #[tokio::test]
    async fn test_declined_print_leaves_completed() {
        let station = PrintStation::new(Arc::new(DecliningPrinter), orders());
        let (ledger, id) = ledger_with(Some(false));

        let outcome = station.print_and_mark(&ledger, Classification::Passed, id).await.unwrap();
        assert_eq!(outcome, PrintOutcome::Rejected);
        let status = ledger.lock().store.get(Classification::Passed, id).unwrap().unwrap().status;
        assert_eq!(status, BundleStatus::Completed);
    }
}
