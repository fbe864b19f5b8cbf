//! Hardware sample types

use serde::{Deserialize, Serialize};

use super::Classification;

/// Cumulative cut counters read from the controller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterReading {
    pub passed: i64,
    pub ndt: i64,
}

impl CounterReading {
    pub fn get(&self, classification: Classification) -> i64 {
        match classification {
            Classification::Passed => self.passed,
            Classification::Ndt => self.ndt,
        }
    }
}

/// Level-sampled "bundle done" flags; edges are derived by the loop.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeFlags {
    pub passed_bundle_done: bool,
    pub ndt_bundle_done: bool,
}

impl EdgeFlags {
    pub fn get(&self, classification: Classification) -> bool {
        match classification {
            Classification::Passed => self.passed_bundle_done,
            Classification::Ndt => self.ndt_bundle_done,
        }
    }
}
