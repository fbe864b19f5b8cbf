//! Tag projection handed to the printer and exporter collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Bundle, Classification, ProductionOrder};

/// Everything a bundle tag shows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrintData {
    pub classification: Classification,
    pub bundle_no: String,
    pub batch_no: String,
    pub piece_count: u32,
    pub order_no: String,
    pub pipe_grade: String,
    pub pipe_size: String,
    pub pipe_length: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_reprint: bool,
}

impl PrintData {
    /// Project a bundle and its order onto a tag. A missing order leaves the
    /// pipe attributes blank and falls back to the raw order id.
    pub fn project(bundle: &Bundle, order: Option<&ProductionOrder>, is_reprint: bool) -> Self {
        let (order_no, pipe_grade, pipe_size, pipe_length) = match order {
            Some(o) => (
                o.order_no.clone(),
                o.pipe_grade.clone(),
                o.pipe_size.clone(),
                o.pipe_length.clone(),
            ),
            None => (
                bundle.order_id.to_string(),
                String::new(),
                String::new(),
                String::new(),
            ),
        };
        Self {
            classification: bundle.classification,
            bundle_no: bundle.bundle_no.clone(),
            batch_no: bundle.batch_no.clone(),
            piece_count: bundle.piece_count,
            order_no,
            pipe_grade,
            pipe_size,
            pipe_length,
            start_time: bundle.started_at,
            end_time: bundle.ended_at,
            is_reprint,
        }
    }
}
