//! The polling orchestrator: one cooperative loop per mill.
//!
//! Per tick:
//! 1. Skip if the controller link is down (one reconnect attempt per tick)
//! 2. Counters → `CutCounterTracker` → `BundleFormationEngine`
//! 3. Edge detection on the order-ended signal and both "bundle done" flags
//! 4. Release paths: order-ended (no ack) and bundle-done (print + ack)
//! 5. Periodic discovery: print every full Completed bundle
//!
//! The first tick after (re)start records counter baselines and edge levels
//! but prints nothing. Every step logs and swallows its own errors; a tick
//! never aborts halfway and never stops the next one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::edge::{Edge, EdgeDetector};
use super::state::{LoopStats, LoopStatus, SharedStats};
use crate::acquisition::ControllerLink;
use crate::bundling::{BundleFormationEngine, CutCounterTracker, Ledger, PrintReadinessGate};
use crate::orders::OrderSource;
use crate::printing::{PrintOutcome, PrintStation};
use crate::types::{Classification, CounterReading, EdgeFlags, OrderContext};

// ============================================================================
// Wiring
// ============================================================================

/// Shared collaborators of the loop and the manual desk
#[derive(Clone)]
pub struct BundleServices {
    pub engine: Arc<BundleFormationEngine>,
    pub ledger: Ledger,
    pub orders: Arc<dyn OrderSource>,
    pub station: Arc<PrintStation>,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub mill_id: u32,
    pub interval: Duration,
    pub passed_ack_address: String,
    pub ndt_ack_address: String,
}

impl LoopSettings {
    pub fn ack_address(&self, classification: Classification) -> &str {
        match classification {
            Classification::Passed => &self.passed_ack_address,
            Classification::Ndt => &self.ndt_ack_address,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub link_up: bool,
    /// False on the startup-quiescence tick
    pub print_phase: bool,
    pub pieces: u32,
    /// Bundle numbers printed this tick, in print order
    pub printed: Vec<String>,
    /// Controller addresses acknowledged this tick
    pub acks: Vec<String>,
    pub errors: u32,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct PollingOrchestrator {
    link: Box<dyn ControllerLink>,
    services: BundleServices,
    settings: LoopSettings,
    stats: SharedStats,
    counters: CutCounterTracker,
    flag_edges: [EdgeDetector; 2],
    order_end_edge: EdgeDetector,
    first_tick: bool,
}

impl PollingOrchestrator {
    pub fn new(link: Box<dyn ControllerLink>, services: BundleServices, settings: LoopSettings) -> Self {
        Self {
            link,
            services,
            settings,
            stats: LoopStats::shared(),
            counters: CutCounterTracker::new(),
            flag_edges: Default::default(),
            order_end_edge: EdgeDetector::new(),
            first_tick: true,
        }
    }

    /// Share an existing stats cell (health checks read it)
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    /// Forget baselines and edge levels; the next tick is a quiescent first tick.
    pub fn reset(&mut self) {
        self.counters.reset();
        self.flag_edges.iter_mut().for_each(EdgeDetector::reset);
        self.order_end_edge.reset();
        self.first_tick = true;
    }

    /// Run at the fixed interval until cancelled.
    pub async fn run(&mut self, cancel: CancellationToken) {
        self.reset();
        {
            let mut stats = self.stats.write().await;
            stats.status = LoopStatus::Running;
            stats.started_at = Some(Utc::now());
        }

        info!(
            mill_id = self.settings.mill_id,
            interval_ms = self.settings.interval.as_millis() as u64,
            link = self.link.link_name(),
            "🔄 Polling loop started"
        );

        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let report = self.tick().await;
            debug!(
                link_up = report.link_up,
                pieces = report.pieces,
                printed = report.printed.len(),
                acks = report.acks.len(),
                errors = report.errors,
                "Tick complete"
            );
        }

        self.stats.write().await.status = LoopStatus::Stopped;
        info!(mill_id = self.settings.mill_id, "Polling loop stopped");
    }

    /// One loop iteration. Always runs to completion; stop requests are only
    /// observed between ticks, so no controller exchange is abandoned halfway.
    pub async fn tick(&mut self) -> TickReport {
        let now = Utc::now();
        let mut report = TickReport::default();
        let mut completed = 0u64;
        let mut dropped = 0u64;

        if !self.link.poll_reconnect().await {
            warn!(link = self.link.link_name(), "Controller link down, skipping tick");
            let mut stats = self.stats.write().await;
            stats.ticks += 1;
            stats.skipped_ticks += 1;
            stats.status = LoopStatus::LinkDown;
            stats.last_tick = Some(now);
            return report;
        }
        report.link_up = true;
        let print_phase = !std::mem::replace(&mut self.first_tick, false);
        report.print_phase = print_phase;

        let ctx = match self.services.orders.active_context(self.settings.mill_id) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(mill_id = self.settings.mill_id, error = %e, "Order context unavailable");
                report.errors += 1;
                None
            }
        };

        // Counters
        let reading = self.read_counters(&mut report).await;
        if let Some(reading) = reading {
            for classification in Classification::ALL {
                let delta = self.counters.sample(classification, reading.get(classification));
                if delta == 0 {
                    continue;
                }
                let result = {
                    let mut state = self.services.ledger.lock();
                    self.services.engine.process_cuts(
                        &mut state,
                        classification,
                        ctx.as_ref(),
                        delta,
                        now,
                    )
                };
                match result {
                    Ok(formed) => {
                        report.pieces += formed.pieces;
                        dropped += u64::from(formed.dropped);
                        completed += formed.completed_full.len() as u64;
                    }
                    Err(e) => {
                        warn!(%classification, delta, error = %e, "Bundle formation failed");
                        report.errors += 1;
                    }
                }
            }
        }

        // Edges are recorded every tick, including the quiescent one
        let flags = self.read_flags(&mut report).await;
        let ended = ctx.as_ref().is_some_and(OrderContext::is_ended);
        let order_edge = self.order_end_edge.update(ended);
        let flag_edges = Classification::ALL.map(|c| self.flag_edges[c.index()].update(flags.get(c)));

        if order_edge == Edge::Rising {
            if let Some(ctx) = ctx.as_ref() {
                self.handle_order_end(ctx, print_phase, &mut report).await;
            }
        }

        for classification in Classification::ALL {
            match flag_edges[classification.index()] {
                Edge::Rising if print_phase => {
                    self.handle_bundle_done(classification, ctx.as_ref(), &mut report)
                        .await;
                }
                Edge::Rising => {
                    info!(%classification, "Bundle-done flag already high at startup, ignoring");
                }
                Edge::Falling => debug!(%classification, "Bundle-done flag cleared"),
                Edge::Steady => {}
            }
        }

        // Periodic discovery
        if print_phase {
            for classification in Classification::ALL {
                self.print_full_bundles(classification, &mut report).await;
            }
        } else {
            debug!("First tick after start, print phase skipped");
        }

        let mut stats = self.stats.write().await;
        stats.ticks += 1;
        stats.status = LoopStatus::Running;
        stats.last_tick = Some(now);
        stats.pieces_processed += u64::from(report.pieces);
        stats.pieces_dropped += dropped;
        stats.bundles_completed += completed;
        stats.bundles_printed += report.printed.len() as u64;
        stats.acks_written += report.acks.len() as u64;
        stats.step_errors += u64::from(report.errors);
        if reading.is_some() {
            stats.last_good_read = Some(now);
        } else {
            stats.read_failures += 1;
        }
        report
    }

    // ========================================================================
    // Hardware reads
    // ========================================================================

    // Reads are bounded by the link's own timeout
    async fn read_counters(&mut self, report: &mut TickReport) -> Option<CounterReading> {
        match self.link.read_extended_counters().await {
            Ok(reading) => Some(reading),
            Err(e) => {
                warn!(error = %e, "Counter read failed, no cuts this tick");
                report.errors += 1;
                None
            }
        }
    }

    async fn read_flags(&mut self, report: &mut TickReport) -> EdgeFlags {
        match self.link.read_edge_flags().await {
            Ok(flags) => flags,
            Err(e) => {
                warn!(error = %e, "Flag read failed, treating flags as low");
                report.errors += 1;
                EdgeFlags::default()
            }
        }
    }

    // ========================================================================
    // Release paths
    // ========================================================================

    /// Order-ended rising edge: close the partial bundles, then release one
    /// per classification. No acknowledgment.
    async fn handle_order_end(&self, ctx: &OrderContext, print_phase: bool, report: &mut TickReport) {
        info!(order_id = ctx.order_id(), order_no = %ctx.order.order_no, "Order ended");
        let now = Utc::now();

        for classification in Classification::ALL {
            let closed = {
                let mut state = self.services.ledger.lock();
                self.services
                    .engine
                    .close_for_order_end(&mut state, classification, ctx.order_id(), now)
            };
            if let Err(e) = closed {
                warn!(%classification, error = %e, "Closing bundle on order end failed");
                report.errors += 1;
                continue;
            }
            if print_phase {
                self.release(classification, Some(ctx.order_id()), report).await;
            }
        }
    }

    /// "Bundle done" rising edge: close the running bundle, release the most
    /// recently ended one, acknowledge to the controller.
    async fn handle_bundle_done(
        &mut self,
        classification: Classification,
        ctx: Option<&OrderContext>,
        report: &mut TickReport,
    ) {
        info!(%classification, "Bundle-done flag raised");

        if let Some(ctx) = ctx {
            let closed = {
                let mut state = self.services.ledger.lock();
                self.services
                    .engine
                    .close_active(&mut state, classification, ctx, Utc::now())
            };
            if let Err(e) = closed {
                warn!(%classification, error = %e, "Closing bundle on operator signal failed");
                report.errors += 1;
            }
        }

        self.release(classification, None, report).await;

        let address = self.settings.ack_address(classification).to_string();
        match self.link.write_ack(&address, true).await {
            Ok(()) => {
                debug!(%classification, address = %address, "Acknowledged bundle-done");
                report.acks.push(address);
            }
            Err(e) => {
                warn!(%classification, address = %address, error = %e, "Acknowledgment write failed");
                report.errors += 1;
            }
        }
    }

    /// Print the most recently ended eligible bundle, if any. With an order
    /// id only that order's bundles are considered.
    async fn release(&self, classification: Classification, order_id: Option<u64>, report: &mut TickReport) {
        let candidate = {
            let state = self.services.ledger.lock();
            match order_id {
                Some(order_id) => PrintReadinessGate::release_candidate_for_order(
                    state.store.as_ref(),
                    classification,
                    order_id,
                ),
                None => PrintReadinessGate::release_candidate(state.store.as_ref(), classification),
            }
        };
        match candidate {
            Ok(Some(bundle)) => self.print(classification, bundle.id, &bundle.bundle_no, report).await,
            Ok(None) => debug!(%classification, "Nothing to release"),
            Err(e) => {
                warn!(%classification, error = %e, "Release lookup failed");
                report.errors += 1;
            }
        }
    }

    async fn print_full_bundles(&self, classification: Classification, report: &mut TickReport) {
        let printable = {
            let state = self.services.ledger.lock();
            PrintReadinessGate::printable(state.store.as_ref(), classification)
        };
        match printable {
            Ok(bundles) => {
                for bundle in bundles {
                    self.print(classification, bundle.id, &bundle.bundle_no, report).await;
                }
            }
            Err(e) => {
                warn!(%classification, error = %e, "Printable lookup failed");
                report.errors += 1;
            }
        }
    }

    async fn print(
        &self,
        classification: Classification,
        id: u64,
        bundle_no: &str,
        report: &mut TickReport,
    ) {
        match self
            .services
            .station
            .print_and_mark(&self.services.ledger, classification, id)
            .await
        {
            Ok(PrintOutcome::Printed) => report.printed.push(bundle_no.to_string()),
            Ok(PrintOutcome::Rejected) => report.errors += 1,
            Ok(_) => {}
            Err(e) => {
                warn!(%classification, bundle_no, error = %e, "Print failed");
                report.errors += 1;
            }
        }
    }
}
