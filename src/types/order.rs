//! Production order context (read-only collaborator data)

use serde::{Deserialize, Serialize};

/// A production order as supplied by the order system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductionOrder {
    pub id: u64,
    /// Human-facing order number, used in NDT numbering and as batch prefix
    pub order_no: String,
    pub mill_id: u32,
    #[serde(default)]
    pub pipe_grade: String,
    /// Decimal-parseable outside diameter, e.g. "4.5"
    #[serde(default)]
    pub pipe_size: String,
    #[serde(default)]
    pub pipe_length: String,
    /// Per-piece weight used for bundle weight (kg)
    #[serde(default)]
    pub piece_weight_kg: f64,
    /// Order-ended signal
    #[serde(default)]
    pub ended: bool,
    /// Running defect count reported against the order
    #[serde(default)]
    pub defect_count: u32,
}

/// A slit (sub-unit of the order's material run).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slit {
    pub id: u64,
    pub order_id: u64,
    #[serde(default)]
    pub code: String,
}

/// Identity of the running production context; a change closes the open bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub order_id: u64,
    pub slit_id: Option<u64>,
}

/// The active order/slit pair cuts are attributed to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderContext {
    pub order: ProductionOrder,
    #[serde(default)]
    pub slit: Option<Slit>,
}

impl OrderContext {
    pub fn new(order: ProductionOrder, slit: Option<Slit>) -> Self {
        Self { order, slit }
    }

    pub fn key(&self) -> ContextKey {
        ContextKey {
            order_id: self.order.id,
            slit_id: self.slit.as_ref().map(|s| s.id),
        }
    }

    pub fn order_id(&self) -> u64 {
        self.order.id
    }

    pub fn slit_id(&self) -> Option<u64> {
        self.slit.as_ref().map(|s| s.id)
    }

    pub fn is_ended(&self) -> bool {
        self.order.ended
    }
}
