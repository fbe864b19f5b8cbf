//! Tag printing and export
//!
//! Printer and exporter are collaborators behind traits; the crate owns only
//! the projection handed to them and the order in which jobs run.
//! - `LogPrinter`: writes tags to the log (default, simulation)
//! - `SpoolPrinter`: one JSON job file per tag in a spool directory
//! - `JsonlExporter`: appends every printed tag to a JSON-lines file
//! - `PrintStation`: serialises jobs and marks bundles printed

pub mod export;
pub mod log_printer;
pub mod spool;
pub mod station;

pub use export::JsonlExporter;
pub use log_printer::LogPrinter;
pub use spool::SpoolPrinter;
pub use station::{PrintOutcome, PrintStation};

use anyhow::Result;
use async_trait::async_trait;

use crate::types::PrintData;

/// Label printer collaborator
#[async_trait]
pub trait LabelPrinter: Send + Sync {
    /// Print one tag. `Ok(false)` means the printer declined the job.
    async fn print_tag(&self, data: &PrintData) -> Result<bool>;

    fn printer_name(&self) -> &'static str;
}

/// Export collaborator, called after every successful print
#[async_trait]
pub trait BundleExporter: Send + Sync {
    async fn export(&self, data: &PrintData) -> Result<()>;
}
