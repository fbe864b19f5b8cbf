//! In-process simulated controller
//!
//! Used by `--simulate` runs and by the polling loop tests. The controller
//! and its `SimHandle` share one state cell, so a test can move counters,
//! raise flags, drop the link and inspect acknowledgments while the loop
//! owns the controller.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rand::Rng;

use super::link::{ControllerLink, LinkError};
use crate::types::{Classification, CounterReading, EdgeFlags};

#[derive(Debug)]
struct SimState {
    connected: bool,
    counters: CounterReading,
    flags: EdgeFlags,
    /// Remaining reads that fail before the controller answers again
    failing_reads: u32,
    acks: Vec<(String, bool)>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            connected: true,
            counters: CounterReading::default(),
            flags: EdgeFlags::default(),
            failing_reads: 0,
            acks: Vec::new(),
        }
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|p| p.into_inner())
}

/// Scripting handle for a `SimulatedController`
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    pub fn set_counter(&self, classification: Classification, value: i64) {
        let mut s = lock(&self.state);
        match classification {
            Classification::Passed => s.counters.passed = value,
            Classification::Ndt => s.counters.ndt = value,
        }
    }

    pub fn add_cuts(&self, classification: Classification, cuts: i64) {
        let mut s = lock(&self.state);
        match classification {
            Classification::Passed => s.counters.passed += cuts,
            Classification::Ndt => s.counters.ndt += cuts,
        }
    }

    pub fn counters(&self) -> CounterReading {
        lock(&self.state).counters
    }

    pub fn set_flag(&self, classification: Classification, high: bool) {
        let mut s = lock(&self.state);
        match classification {
            Classification::Passed => s.flags.passed_bundle_done = high,
            Classification::Ndt => s.flags.ndt_bundle_done = high,
        }
    }

    /// Make the next `reads` counter/flag reads fail
    pub fn fail_reads(&self, reads: u32) {
        lock(&self.state).failing_reads = reads;
    }

    /// Every acknowledgment written so far
    pub fn acks(&self) -> Vec<(String, bool)> {
        lock(&self.state).acks.clone()
    }
}

/// Simulated mill controller
#[derive(Debug)]
pub struct SimulatedController {
    state: Arc<Mutex<SimState>>,
    /// Upper bound of random passed cuts added per counter read
    random_cuts: Option<u32>,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            random_cuts: None,
        }
    }

    /// Generate up to `max_per_read` random passed cuts on every counter
    /// read, with an occasional NDT cut.
    pub fn with_random_cuts(mut self, max_per_read: u32) -> Self {
        self.random_cuts = (max_per_read > 0).then_some(max_per_read);
        self
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn check_read(s: &mut SimState) -> Result<(), LinkError> {
        if !s.connected {
            return Err(LinkError::NotConnected);
        }
        if s.failing_reads > 0 {
            s.failing_reads -= 1;
            return Err(LinkError::Timeout);
        }
        Ok(())
    }

    fn generate_cuts(&self, s: &mut SimState) {
        let Some(max) = self.random_cuts else {
            return;
        };
        let mut rng = rand::thread_rng();
        s.counters.passed += i64::from(rng.gen_range(0..=max));
        if rng.gen_bool(0.1) {
            s.counters.ndt += 1;
        }
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControllerLink for SimulatedController {
    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    async fn read_extended_counters(&mut self) -> Result<CounterReading, LinkError> {
        let mut s = lock(&self.state);
        Self::check_read(&mut s)?;
        self.generate_cuts(&mut s);
        Ok(s.counters)
    }

    async fn read_edge_flags(&mut self) -> Result<EdgeFlags, LinkError> {
        let mut s = lock(&self.state);
        Self::check_read(&mut s)?;
        Ok(s.flags)
    }

    async fn write_ack(&mut self, address: &str, value: bool) -> Result<(), LinkError> {
        let mut s = lock(&self.state);
        if !s.connected {
            return Err(LinkError::NotConnected);
        }
        s.acks.push((address.to_string(), value));
        Ok(())
    }

    fn link_name(&self) -> &'static str {
        "simulated"
    }
}
