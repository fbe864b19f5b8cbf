//! Production order context
//!
//! The order system is a collaborator: the loop only asks which order/slit
//! is running on a mill and looks orders up by id for tag printing.
//! - `StaticOrderSource`: swappable in-memory book (tests, simulation, config)
//! - `FileOrderSource`: JSON document re-read when it changes on disk

pub mod file;
pub mod static_source;

pub use file::FileOrderSource;
pub use static_source::StaticOrderSource;

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::types::{OrderContext, ProductionOrder};

/// Read-only order lookups used by the loop and the print station
pub trait OrderSource: Send + Sync {
    /// The order/slit currently running on a mill
    fn active_context(&self, mill_id: u32) -> Result<Option<OrderContext>>;

    fn order_by_id(&self, order_id: u64) -> Result<Option<ProductionOrder>>;

    fn source_name(&self) -> &'static str;
}

/// Snapshot of known orders and what each mill is running.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    /// Running context per mill
    #[serde(default)]
    pub active: Vec<OrderContext>,
    /// Other orders that may still own bundles
    #[serde(default)]
    pub orders: Vec<ProductionOrder>,
}

impl OrderBook {
    pub fn active_for(&self, mill_id: u32) -> Option<&OrderContext> {
        self.active.iter().find(|c| c.order.mill_id == mill_id)
    }

    /// Active contexts win over the archive when an id appears in both.
    pub fn order(&self, order_id: u64) -> Option<&ProductionOrder> {
        self.active
            .iter()
            .map(|c| &c.order)
            .find(|o| o.id == order_id)
            .or_else(|| self.orders.iter().find(|o| o.id == order_id))
    }

    /// Replace the running context of the context's mill
    pub fn set_active(&mut self, ctx: OrderContext) {
        let mill = ctx.order.mill_id;
        if let Some(prev) = self.active.iter().position(|c| c.order.mill_id == mill) {
            let old = self.active.swap_remove(prev);
            if old.order.id != ctx.order.id {
                self.archive(old.order);
            }
        }
        self.active.push(ctx);
    }

    pub fn clear_active(&mut self, mill_id: u32) {
        let (gone, kept): (Vec<_>, Vec<_>) = self
            .active
            .drain(..)
            .partition(|c| c.order.mill_id == mill_id);
        self.active = kept;
        for ctx in gone {
            self.archive(ctx.order);
        }
    }

    fn archive(&mut self, order: ProductionOrder) {
        let mut by_id: HashMap<u64, ProductionOrder> =
            self.orders.drain(..).map(|o| (o.id, o)).collect();
        by_id.insert(order.id, order);
        self.orders = by_id.into_values().collect();
        self.orders.sort_by_key(|o| o.id);
    }
}
