//! Polling loop integration tests
//!
//! A `SimulatedController` stands in for the mill controller; its handle
//! scripts counters, flags and connectivity between ticks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use mill_bundle::acquisition::{GatewayController, SimHandle, SimulatedController};
use mill_bundle::bundling::{
    BundleError, BundleFormationEngine, ClassificationSet, Ledger, ThresholdResolver,
};
use mill_bundle::orders::{OrderSource, StaticOrderSource};
use mill_bundle::pipeline::{
    BundleServices, LoopController, LoopSettings, LoopStatus, ManualDesk, PollingOrchestrator,
};
use mill_bundle::printing::{LogPrinter, PrintOutcome, PrintStation};
use mill_bundle::storage::InMemoryStore;
use mill_bundle::types::{
    BundleStatus, Classification, FormationChartEntry, OrderContext, ProductionOrder,
};

// ============================================================================
// Fixtures
// ============================================================================

const PASSED_ACK: &str = "OK_BUNDLE_ACK";
const NDT_ACK: &str = "NDT_BUNDLE_ACK";

fn order() -> ProductionOrder {
    ProductionOrder {
        id: 7,
        order_no: "W700".to_string(),
        mill_id: 1,
        pipe_grade: "API 5L X42".to_string(),
        pipe_size: "4.5".to_string(),
        pipe_length: "12.0".to_string(),
        piece_weight_kg: 80.0,
        ended: false,
        defect_count: 0,
    }
}

struct Rig {
    orchestrator: PollingOrchestrator,
    sim: SimHandle,
    orders: StaticOrderSource,
    printer: Arc<LogPrinter>,
    services: BundleServices,
}

fn settings(interval: Duration) -> LoopSettings {
    LoopSettings {
        mill_id: 1,
        interval,
        passed_ack_address: PASSED_ACK.to_string(),
        ndt_ack_address: NDT_ACK.to_string(),
    }
}

fn rig_with_interval(interval: Duration) -> Rig {
    let controller = SimulatedController::new();
    let sim = controller.handle();
    let orders = StaticOrderSource::with_active(order());
    let order_source: Arc<dyn OrderSource> = Arc::new(orders.clone());
    let printer = Arc::new(LogPrinter::new());

    let services = BundleServices {
        engine: Arc::new(BundleFormationEngine::new(
            ClassificationSet::default(),
            ThresholdResolver::new(vec![FormationChartEntry::new(1, None, 13)]),
        )),
        ledger: Ledger::new(Box::new(InMemoryStore::new())),
        orders: Arc::clone(&order_source),
        station: Arc::new(PrintStation::new(printer.clone(), order_source)),
    };
    let orchestrator =
        PollingOrchestrator::new(Box::new(controller), services.clone(), settings(interval));

    Rig {
        orchestrator,
        sim,
        orders,
        printer,
        services,
    }
}

fn rig() -> Rig {
    rig_with_interval(Duration::from_millis(10))
}

fn passed_bundles(rig: &Rig) -> Vec<mill_bundle::types::Bundle> {
    rig.services
        .ledger
        .lock()
        .store
        .get_all(Classification::Passed)
        .unwrap()
}

// ============================================================================
// Tick semantics
// ============================================================================

#[tokio::test]
async fn first_tick_skips_printing_then_prints_existing_full_bundles() {
    let mut rig = rig();

    // A full bundle left over from before the restart
    {
        let ctx = OrderContext::new(order(), None);
        let mut state = rig.services.ledger.lock();
        rig.services
            .engine
            .process_cuts(&mut state, Classification::Passed, Some(&ctx), 13, Utc::now())
            .unwrap();
    }

    let first = rig.orchestrator.tick().await;
    assert!(first.link_up);
    assert!(!first.print_phase);
    assert!(first.printed.is_empty());
    assert!(rig.printer.printed().is_empty());

    let second = rig.orchestrator.tick().await;
    assert!(second.print_phase);
    assert_eq!(second.printed.len(), 1);
    assert_eq!(passed_bundles(&rig)[0].status, BundleStatus::Printed);
}

#[tokio::test]
async fn counter_delta_forms_and_prints_full_bundles() {
    let mut rig = rig();
    rig.sim.set_counter(Classification::Passed, 100);

    let baseline = rig.orchestrator.tick().await;
    assert_eq!(baseline.pieces, 0);

    rig.sim.set_counter(Classification::Passed, 130);
    let report = rig.orchestrator.tick().await;
    assert_eq!(report.pieces, 30);
    assert_eq!(report.printed.len(), 2);

    let printed = rig.printer.printed();
    assert_eq!(printed.len(), 2);
    assert!(printed.iter().all(|t| t.piece_count == 13 && !t.is_reprint));
    assert_eq!(printed[0].order_no, "W700");

    let bundles = passed_bundles(&rig);
    assert_eq!(bundles.len(), 3);
    assert_eq!(bundles[2].piece_count, 4);
    assert!(bundles[2].is_active());

    let stats = rig.orchestrator.stats();
    let stats = stats.read().await;
    assert_eq!(stats.pieces_processed, 30);
    assert_eq!(stats.bundles_completed, 2);
    assert_eq!(stats.bundles_printed, 2);
}

#[tokio::test]
async fn bundle_done_flag_closes_prints_and_acknowledges_once() {
    let mut rig = rig();

    rig.orchestrator.tick().await;
    rig.sim.add_cuts(Classification::Passed, 5);
    rig.orchestrator.tick().await;
    assert!(passed_bundles(&rig)[0].is_active());

    rig.sim.set_flag(Classification::Passed, true);
    let report = rig.orchestrator.tick().await;
    assert_eq!(report.printed.len(), 1);
    assert_eq!(report.acks, vec![PASSED_ACK.to_string()]);

    let bundles = passed_bundles(&rig);
    assert_eq!(bundles[0].status, BundleStatus::Printed);
    assert!(!bundles[0].is_full);
    assert!(bundles[0].operator_done_at.is_some());

    // Still high: no second edge
    let steady = rig.orchestrator.tick().await;
    assert!(steady.acks.is_empty());
    assert_eq!(rig.sim.acks(), vec![(PASSED_ACK.to_string(), true)]);
}

#[tokio::test]
async fn flag_already_high_at_startup_is_ignored() {
    let mut rig = rig();
    rig.sim.set_flag(Classification::Ndt, true);

    rig.orchestrator.tick().await;
    rig.orchestrator.tick().await;
    assert!(rig.sim.acks().is_empty());

    // A fresh edge after it drops is handled
    rig.sim.set_flag(Classification::Ndt, false);
    rig.orchestrator.tick().await;
    rig.sim.set_flag(Classification::Ndt, true);
    let report = rig.orchestrator.tick().await;
    assert_eq!(report.acks, vec![NDT_ACK.to_string()]);
}

#[tokio::test]
async fn order_end_releases_partial_bundle_without_ack() {
    let mut rig = rig();

    rig.orchestrator.tick().await;
    rig.sim.add_cuts(Classification::Passed, 4);
    rig.orchestrator.tick().await;

    rig.orders.set_ended(1, true);
    let report = rig.orchestrator.tick().await;
    assert_eq!(report.printed.len(), 1);
    assert!(report.acks.is_empty());
    assert!(rig.sim.acks().is_empty());

    let printed = rig.printer.printed();
    assert_eq!(printed.len(), 1);
    assert_eq!(printed[0].piece_count, 4);

    let bundles = passed_bundles(&rig);
    assert_eq!(bundles[0].status, BundleStatus::Printed);
    assert!(!bundles[0].is_full);
}

#[tokio::test]
async fn order_end_releases_only_that_orders_bundles() {
    let mut rig = rig();

    // NDT partial left Completed by an earlier order
    let earlier = {
        let mut previous = order();
        previous.id = 6;
        previous.order_no = "W600".to_string();
        let ctx = OrderContext::new(previous, None);
        let mut state = rig.services.ledger.lock();
        rig.services
            .engine
            .process_cuts(&mut state, Classification::Ndt, Some(&ctx), 3, Utc::now())
            .unwrap();
        rig.services
            .engine
            .close_for_order_end(&mut state, Classification::Ndt, 6, Utc::now())
            .unwrap()
            .unwrap()
    };

    rig.orchestrator.tick().await;
    rig.sim.add_cuts(Classification::Passed, 5);
    rig.orchestrator.tick().await;

    rig.orders.set_ended(1, true);
    let report = rig.orchestrator.tick().await;
    assert_eq!(report.printed.len(), 1);

    let printed = rig.printer.printed();
    assert_eq!(printed.len(), 1);
    assert_eq!(printed[0].order_no, "W700");
    assert_eq!(printed[0].piece_count, 5);

    let leftover = rig
        .services
        .ledger
        .lock()
        .store
        .get(Classification::Ndt, earlier.id)
        .unwrap()
        .unwrap();
    assert_eq!(leftover.status, BundleStatus::Completed);
}

#[tokio::test]
async fn link_down_skips_the_tick() {
    let mut rig = rig();
    rig.sim.set_connected(false);

    let report = rig.orchestrator.tick().await;
    assert!(!report.link_up);
    {
        let stats = rig.orchestrator.stats();
        let stats = stats.read().await;
        assert_eq!(stats.skipped_ticks, 1);
        assert_eq!(stats.status, LoopStatus::LinkDown);
    }

    // Quiescence applies to the first tick that actually runs
    rig.sim.set_connected(true);
    let report = rig.orchestrator.tick().await;
    assert!(report.link_up);
    assert!(!report.print_phase);
}

#[tokio::test]
async fn failed_reads_lose_no_cuts() {
    let mut rig = rig();

    rig.orchestrator.tick().await;
    rig.sim.add_cuts(Classification::Passed, 6);
    rig.sim.fail_reads(2);

    let failed = rig.orchestrator.tick().await;
    assert_eq!(failed.pieces, 0);
    assert_eq!(failed.errors, 2);

    let recovered = rig.orchestrator.tick().await;
    assert_eq!(recovered.pieces, 6);

    let stats = rig.orchestrator.stats();
    assert_eq!(stats.read().await.read_failures, 1);
}

#[tokio::test]
async fn cuts_without_running_order_are_dropped() {
    let mut rig = rig();
    rig.orders.clear_active(1);

    rig.orchestrator.tick().await;
    rig.sim.add_cuts(Classification::Ndt, 3);
    let report = rig.orchestrator.tick().await;
    assert_eq!(report.pieces, 0);

    let stats = rig.orchestrator.stats();
    assert_eq!(stats.read().await.pieces_dropped, 3);
}

// ============================================================================
// Loop controller
// ============================================================================

#[tokio::test]
async fn controller_starts_and_stops_the_loop() {
    let rig = rig_with_interval(Duration::from_millis(5));
    let stats = rig.orchestrator.stats();
    let controller = LoopController::new(rig.orchestrator, CancellationToken::new());

    assert!(!controller.is_running());
    assert!(controller.start().await);
    assert!(!controller.start().await);
    assert!(controller.is_running());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(controller.stop().await);
    assert!(!controller.is_running());
    assert!(!controller.stop().await);

    let ticks = {
        let stats = stats.read().await;
        assert_eq!(stats.status, LoopStatus::Stopped);
        stats.ticks
    };
    assert!(ticks > 0);

    // Restart runs again from a quiescent first tick
    assert!(controller.start().await);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(controller.stop().await);
    assert!(stats.read().await.ticks > ticks);
}

#[tokio::test]
async fn parent_cancellation_stops_the_loop() {
    let rig = rig_with_interval(Duration::from_millis(5));
    let root = CancellationToken::new();
    let controller = LoopController::new(rig.orchestrator, root.clone());

    assert!(controller.start().await);
    root.cancel();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!controller.is_running());
}

#[test]
fn polling_loop_can_run_on_a_spawned_task() {
    fn assert_send<T: Send>(_: &T) {}
    fn assert_sync<T: Sync>() {}

    assert_sync::<PollingOrchestrator>();
    let mut rig = rig();
    let run = rig.orchestrator.run(CancellationToken::new());
    assert_send(&run);
}

/// Gateway that answers by request type. The first reply is held back.
async fn spawn_slow_gateway(first_reply_delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut delay = Some(first_reply_delay);
        let mut passed = 100;
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(delay) = delay.take() {
                tokio::time::sleep(delay).await;
            }
            let reply = if line.contains("read_counters") {
                passed += 1;
                format!(r#"{{"ok":true,"passed":{passed},"ndt":0}}"#)
            } else {
                r#"{"ok":true,"passed_bundle_done":false,"ndt_bundle_done":false}"#.to_string()
            };
            if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                break;
            }
        }
    });
    addr
}

#[tokio::test]
async fn stop_during_slow_read_finishes_the_tick() {
    let addr = spawn_slow_gateway(Duration::from_millis(300)).await;
    let rig = rig();
    let mut orchestrator = PollingOrchestrator::new(
        Box::new(GatewayController::new(addr)),
        rig.services.clone(),
        settings(Duration::from_millis(10)),
    );

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::join!(orchestrator.run(cancel), async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.cancel();
    });
    {
        let stats = orchestrator.stats();
        let stats = stats.read().await;
        assert!(stats.ticks >= 1);
        assert_eq!(stats.step_errors, 0);
    }

    // Every later request still gets its own reply
    for _ in 0..2 {
        let report = orchestrator.tick().await;
        assert!(report.link_up);
        assert_eq!(report.errors, 0);
        assert_eq!(report.pieces, 1);
    }
}

// ============================================================================
// Manual desk
// ============================================================================

#[tokio::test]
async fn manual_desk_enters_cuts_and_reprints() {
    let rig = rig();
    let desk = ManualDesk::new(rig.services.clone());

    assert!(matches!(
        desk.process_cuts(1, Classification::Passed, 0),
        Err(BundleError::InvalidCount(0))
    ));
    assert!(matches!(
        desk.process_cuts(9, Classification::Passed, 5),
        Err(BundleError::NoActiveOrder(9))
    ));

    let report = assert_ok!(desk.process_cuts(1, Classification::Passed, 13));
    let id = report.completed_full[0];

    assert_eq!(assert_ok!(desk.print(Classification::Passed, id).await), PrintOutcome::Printed);
    assert_eq!(assert_ok!(desk.print(Classification::Passed, id).await), PrintOutcome::Reprinted);

    let printed = rig.printer.printed();
    assert_eq!(printed.len(), 2);
    assert!(!printed[0].is_reprint);
    assert!(printed[1].is_reprint);
}

#[tokio::test]
async fn manual_print_of_active_bundle_is_refused() {
    let rig = rig();
    let desk = ManualDesk::new(rig.services.clone());

    let report = assert_ok!(desk.process_cuts(1, Classification::Ndt, 2));
    let active = report.active.unwrap();

    let err = assert_err!(desk.print(Classification::Ndt, active).await);
    assert!(matches!(err, BundleError::StillActive { .. }));
    assert!(rig.printer.printed().is_empty());
}
