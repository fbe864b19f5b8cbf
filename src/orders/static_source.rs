//! Lock-free swappable order book

use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;

use super::{OrderBook, OrderSource};
use crate::types::{OrderContext, ProductionOrder, Slit};

/// In-memory order source. Cheap to clone; clones share the book.
#[derive(Clone, Default)]
pub struct StaticOrderSource {
    book: Arc<ArcSwap<OrderBook>>,
}

impl StaticOrderSource {
    pub fn new(book: OrderBook) -> Self {
        Self {
            book: Arc::new(ArcSwap::from_pointee(book)),
        }
    }

    /// Source with a single running order and no slit
    pub fn with_active(order: ProductionOrder) -> Self {
        let mut book = OrderBook::default();
        book.set_active(OrderContext::new(order, None));
        Self::new(book)
    }

    fn update(&self, f: impl Fn(&mut OrderBook)) {
        self.book.rcu(|current| {
            let mut next = OrderBook::clone(current);
            f(&mut next);
            next
        });
    }

    pub fn set_active(&self, ctx: OrderContext) {
        self.update(|book| book.set_active(ctx.clone()));
    }

    pub fn clear_active(&self, mill_id: u32) {
        self.update(|book| book.clear_active(mill_id));
    }

    /// Raise or lower the order-ended signal of a mill's running order
    pub fn set_ended(&self, mill_id: u32, ended: bool) {
        self.update(|book| {
            if let Some(ctx) = book.active.iter_mut().find(|c| c.order.mill_id == mill_id) {
                ctx.order.ended = ended;
            }
        });
    }

    pub fn set_slit(&self, mill_id: u32, slit: Option<Slit>) {
        self.update(|book| {
            if let Some(ctx) = book.active.iter_mut().find(|c| c.order.mill_id == mill_id) {
                ctx.slit = slit.clone();
            }
        });
    }

    pub fn snapshot(&self) -> Arc<OrderBook> {
        self.book.load_full()
    }
}

impl OrderSource for StaticOrderSource {
    fn active_context(&self, mill_id: u32) -> Result<Option<OrderContext>> {
        Ok(self.book.load().active_for(mill_id).cloned())
    }

    fn order_by_id(&self, order_id: u64) -> Result<Option<ProductionOrder>> {
        Ok(self.book.load().order(order_id).cloned())
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: u64, mill_id: u32) -> ProductionOrder {
        ProductionOrder {
            id,
            order_no: format!("ORD{id}"),
            mill_id,
            pipe_grade: String::new(),
            pipe_size: "4.5".into(),
            pipe_length: String::new(),
            piece_weight_kg: 0.0,
            ended: false,
            defect_count: 0,
        }
    }

    #[test]
    fn test_switching_order_archives_previous() {
        let source = StaticOrderSource::with_active(order(1, 1));
        source.set_active(OrderContext::new(order(2, 1), None));

        let active = source.active_context(1).unwrap().unwrap();
        assert_eq!(active.order.id, 2);
        assert_eq!(source.order_by_id(1).unwrap().unwrap().order_no, "ORD1");
        assert!(source.active_context(2).unwrap().is_none());
    }

    #[test]
    fn test_clones_share_book() {
        let source = StaticOrderSource::with_active(order(5, 3));
        let other = source.clone();
        other.set_ended(3, true);
        assert!(source.active_context(3).unwrap().unwrap().is_ended());

        other.clear_active(3);
        assert!(source.active_context(3).unwrap().is_none());
        assert!(source.order_by_id(5).unwrap().is_some());
    }
}
