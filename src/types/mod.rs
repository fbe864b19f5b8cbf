//! Shared data structures for pipe bundle formation
//!
//! This module defines the core types flowing through the bundling pipeline:
//! - Classification: the two independent piece streams (passed / NDT)
//! - Bundle: the ledger record packed by the formation engine
//! - ProductionOrder / Slit / OrderContext: read-only order context
//! - FormationChartEntry: pieces-per-bundle lookup rows
//! - CounterReading / EdgeFlags: one hardware sample
//! - PrintData: the tag projection handed to printer and exporter

mod bundle;
mod chart;
mod hardware;
mod order;
mod print;

pub use bundle::*;
pub use chart::*;
pub use hardware::*;
pub use order::*;
pub use print::*;
