//! Formation chart rows: (mill, pipe size) → pieces per bundle

use serde::{Deserialize, Serialize};

/// One row of the bundle formation chart.
///
/// A row with `pipe_size = None` is the mill's default and must exist for
/// every mill that appears in the chart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormationChartEntry {
    pub mill_id: u32,
    /// Outside diameter this row applies to; `None` for the mill default
    #[serde(default)]
    pub pipe_size: Option<f64>,
    pub pieces_per_bundle: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl FormationChartEntry {
    pub fn new(mill_id: u32, pipe_size: Option<f64>, pieces_per_bundle: u32) -> Self {
        Self {
            mill_id,
            pipe_size,
            pieces_per_bundle,
            active: true,
        }
    }

    pub fn is_default(&self) -> bool {
        self.pipe_size.is_none()
    }
}
