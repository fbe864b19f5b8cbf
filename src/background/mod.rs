//! Background services: health checks and self-healing
//!
//! Runs as a background tokio task next to the polling loop and stops with
//! the same root cancellation token.

pub mod self_healer;

pub use self_healer::{
    ComponentHealth, DiskHealthCheck, HealAction, HealthCheck, HealthStatus, LinkHealthCheck,
    SelfHealer, SystemHealth,
};
