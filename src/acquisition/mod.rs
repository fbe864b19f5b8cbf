//! Hardware controller access
//!
//! The polling loop talks to the mill controller through `ControllerLink`.
//! Backends:
//! - `SimulatedController`: in-process, scriptable through a `SimHandle`
//! - `GatewayController`: JSON-lines over TCP to a PLC gateway

pub mod gateway;
pub mod link;
pub mod simulated;

pub use gateway::GatewayController;
pub use link::{ControllerLink, LinkError};
pub use simulated::{SimHandle, SimulatedController};
