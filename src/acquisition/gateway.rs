//! PLC gateway client
//!
//! Speaks a small JSON-lines request/response protocol to a gateway process
//! that fronts the mill PLC. One request per line, one response per line:
//!
//! ```text
//! → {"op":"read_counters"}
//! ← {"ok":true,"passed":1204,"ndt":17}
//! → {"op":"read_flags"}
//! ← {"ok":true,"passed_bundle_done":false,"ndt_bundle_done":true}
//! → {"op":"write","address":"NDT_BUNDLE_ACK","value":true}
//! ← {"ok":true}
//! ```
//!
//! A failed exchange drops the connection; `poll_reconnect` makes one
//! connect attempt per call, so the loop retries at its own cadence.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::link::{ControllerLink, LinkError};
use crate::config::defaults::{
    DEFAULT_GATEWAY_READ_TIMEOUT_SECS, GATEWAY_CONNECT_TIMEOUT_SECS, GATEWAY_KEEPALIVE_SECS,
};
use crate::types::{CounterReading, EdgeFlags};

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum GatewayRequest<'a> {
    ReadCounters,
    ReadFlags,
    Write { address: &'a str, value: bool },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GatewayResponse {
    ok: bool,
    error: Option<String>,
    passed: Option<i64>,
    ndt: Option<i64>,
    passed_bundle_done: Option<bool>,
    ndt_bundle_done: Option<bool>,
}

/// TCP client for the PLC gateway
pub struct GatewayController {
    address: String,
    stream: Option<BufReader<TcpStream>>,
    read_timeout: Duration,
    connect_timeout: Duration,
    line_buffer: String,
}

impl GatewayController {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            stream: None,
            read_timeout: Duration::from_secs(DEFAULT_GATEWAY_READ_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(GATEWAY_CONNECT_TIMEOUT_SECS),
            line_buffer: String::with_capacity(128),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect with timeout and TCP keepalive
    pub async fn connect(&mut self) -> Result<(), LinkError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| LinkError::Timeout)?
            .map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;

        let sock_ref = socket2::SockRef::from(&stream);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(Duration::from_secs(GATEWAY_KEEPALIVE_SECS))
            .with_interval(Duration::from_secs(GATEWAY_KEEPALIVE_SECS / 3));
        let _ = sock_ref.set_tcp_keepalive(&keepalive);
        let _ = stream.set_nodelay(true);

        self.stream = Some(BufReader::new(stream));
        tracing::info!(address = %self.address, "Gateway connection established");
        Ok(())
    }

    fn drop_connection(&mut self, reason: &LinkError) {
        if self.stream.take().is_some() {
            tracing::warn!(address = %self.address, error = %reason, "Gateway connection dropped");
        }
    }

    async fn exchange(&mut self, request: &GatewayRequest<'_>) -> Result<GatewayResponse, LinkError> {
        let result = self.exchange_inner(request).await;
        if let Err(e) = &result {
            if !matches!(e, LinkError::Rejected(_)) {
                self.drop_connection(e);
            }
        }
        result
    }

    async fn exchange_inner(
        &mut self,
        request: &GatewayRequest<'_>,
    ) -> Result<GatewayResponse, LinkError> {
        let reader = self.stream.as_mut().ok_or(LinkError::NotConnected)?;

        let mut payload =
            serde_json::to_vec(request).map_err(|e| LinkError::Protocol(e.to_string()))?;
        payload.push(b'\n');
        reader
            .get_mut()
            .write_all(&payload)
            .await
            .map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;

        self.line_buffer.clear();
        let bytes = tokio::time::timeout(self.read_timeout, reader.read_line(&mut self.line_buffer))
            .await
            .map_err(|_| LinkError::Timeout)?
            .map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;
        if bytes == 0 {
            return Err(LinkError::ConnectionClosed);
        }

        let response: GatewayResponse = serde_json::from_str(self.line_buffer.trim())
            .map_err(|e| LinkError::Protocol(e.to_string()))?;
        if !response.ok {
            return Err(LinkError::Rejected(
                response.error.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }
        Ok(response)
    }
}

fn field<T>(value: Option<T>, name: &str) -> Result<T, LinkError> {
    value.ok_or_else(|| LinkError::Protocol(format!("response missing '{name}'")))
}

#[async_trait]
impl ControllerLink for GatewayController {
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn poll_reconnect(&mut self) -> bool {
        if self.stream.is_none() {
            if let Err(e) = self.connect().await {
                tracing::debug!(address = %self.address, error = %e, "Gateway reconnect failed");
            }
        }
        self.stream.is_some()
    }

    async fn read_extended_counters(&mut self) -> Result<CounterReading, LinkError> {
        let r = self.exchange(&GatewayRequest::ReadCounters).await?;
        Ok(CounterReading {
            passed: field(r.passed, "passed")?,
            ndt: field(r.ndt, "ndt")?,
        })
    }

    async fn read_edge_flags(&mut self) -> Result<EdgeFlags, LinkError> {
        let r = self.exchange(&GatewayRequest::ReadFlags).await?;
        Ok(EdgeFlags {
            passed_bundle_done: field(r.passed_bundle_done, "passed_bundle_done")?,
            ndt_bundle_done: field(r.ndt_bundle_done, "ndt_bundle_done")?,
        })
    }

    async fn write_ack(&mut self, address: &str, value: bool) -> Result<(), LinkError> {
        self.exchange(&GatewayRequest::Write { address, value }).await?;
        Ok(())
    }

    fn link_name(&self) -> &'static str {
        "gateway"
    }
}
