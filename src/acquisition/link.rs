//! Controller link abstraction

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CounterReading, EdgeFlags};

/// Controller link errors
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Controller link is down")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout waiting for controller")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Controller rejected request: {0}")]
    Rejected(String),
}

/// Capability interface every controller backend implements.
#[async_trait]
pub trait ControllerLink: Send + Sync {
    /// Whether the link is currently usable
    fn is_connected(&self) -> bool;

    /// Give a down link one chance to come back. Called once per tick
    /// before the loop decides to skip it. Returns the new state.
    async fn poll_reconnect(&mut self) -> bool {
        self.is_connected()
    }

    /// Cumulative cut counters for both classifications
    async fn read_extended_counters(&mut self) -> Result<CounterReading, LinkError>;

    /// Current level of the "bundle done" flags
    async fn read_edge_flags(&mut self) -> Result<EdgeFlags, LinkError>;

    /// Write a boolean to a symbolic controller address
    async fn write_ack(&mut self, address: &str, value: bool) -> Result<(), LinkError>;

    /// Backend name for logging
    fn link_name(&self) -> &'static str;
}
