//! Order book from a JSON file
//!
//! The order system drops a JSON document (see `OrderBook`) on disk; it is
//! re-read whenever its modification time changes. A broken rewrite keeps
//! serving the last good copy.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::{Context, Result};

use super::{OrderBook, OrderSource};
use crate::types::{OrderContext, ProductionOrder};

struct Cached {
    modified: SystemTime,
    book: Arc<OrderBook>,
}

pub struct FileOrderSource {
    path: PathBuf,
    cache: Mutex<Option<Cached>>,
}

impl FileOrderSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_book(&self) -> Result<OrderBook> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read order file {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse order file {}", self.path.display()))
    }

    fn current(&self) -> Result<Arc<OrderBook>> {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());

        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Order file unavailable: {}", self.path.display()));

        let modified = match (modified, cache.as_ref()) {
            (Ok(m), _) => m,
            (Err(e), Some(cached)) => {
                tracing::warn!(error = %e, "Serving cached order book");
                return Ok(Arc::clone(&cached.book));
            }
            (Err(e), None) => return Err(e),
        };

        if let Some(cached) = cache.as_ref() {
            if cached.modified == modified {
                return Ok(Arc::clone(&cached.book));
            }
        }

        match self.read_book() {
            Ok(book) => {
                let book = Arc::new(book);
                tracing::info!(
                    path = %self.path.display(),
                    active = book.active.len(),
                    orders = book.orders.len(),
                    "Order book loaded"
                );
                *cache = Some(Cached {
                    modified,
                    book: Arc::clone(&book),
                });
                Ok(book)
            }
            Err(e) => match cache.as_ref() {
                Some(cached) => {
                    tracing::warn!(error = %e, "Order file unreadable, keeping previous book");
                    Ok(Arc::clone(&cached.book))
                }
                None => Err(e),
            },
        }
    }
}

impl OrderSource for FileOrderSource {
    fn active_context(&self, mill_id: u32) -> Result<Option<OrderContext>> {
        Ok(self.current()?.active_for(mill_id).cloned())
    }

    fn order_by_id(&self, order_id: u64) -> Result<Option<ProductionOrder>> {
        Ok(self.current()?.order(order_id).cloned())
    }

    fn source_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    const BOOK: &str = r#"{
        "active": [
            {"order": {"id": 7, "order_no": "W-7", "mill_id": 2, "pipe_size": "6.625"},
             "slit": {"id": 70, "order_id": 7}}
        ],
        "orders": [{"id": 3, "order_no": "W-3", "mill_id": 2}]
    }"#;

    #[test]
    fn test_reads_active_and_archived_orders() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.json");
        std::fs::write(&path, BOOK).unwrap();

        let source = FileOrderSource::new(&path);
        let ctx = source.active_context(2).unwrap().unwrap();
        assert_eq!(ctx.order.order_no, "W-7");
        assert_eq!(ctx.slit_id(), Some(70));
        assert_eq!(source.order_by_id(3).unwrap().unwrap().order_no, "W-3");
        assert!(source.active_context(1).unwrap().is_none());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let source = FileOrderSource::new(dir.path().join("nope.json"));
        assert!(source.active_context(1).is_err());
    }

    #[test]
    fn test_broken_rewrite_keeps_last_good_book() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.json");
        std::fs::write(&path, BOOK).unwrap();
        let source = FileOrderSource::new(&path);
        assert!(source.active_context(2).unwrap().is_some());

        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(&path, "{ not json").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();

        assert_eq!(
            source.active_context(2).unwrap().unwrap().order.order_no,
            "W-7"
        );
    }
}
