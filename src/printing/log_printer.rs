use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::LabelPrinter;
use crate::types::PrintData;

/// Printer that logs each tag and remembers what it printed.
#[derive(Debug, Default)]
pub struct LogPrinter {
    printed: Mutex<Vec<PrintData>>,
}

impl LogPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags printed so far, oldest first
    pub fn printed(&self) -> Vec<PrintData> {
        self.printed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl LabelPrinter for LogPrinter {
    async fn print_tag(&self, data: &PrintData) -> Result<bool> {
        tracing::info!(
            classification = %data.classification,
            bundle_no = %data.bundle_no,
            batch_no = %data.batch_no,
            pieces = data.piece_count,
            order_no = %data.order_no,
            reprint = data.is_reprint,
            "🏷️  Tag printed"
        );
        self.printed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(data.clone());
        Ok(true)
    }

    fn printer_name(&self) -> &'static str {
        "log"
    }
}
