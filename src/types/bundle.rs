//! Bundle ledger record and its lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ledger-assigned bundle identifier.
pub type BundleId = u64;

// ============================================================================
// Classification
// ============================================================================

/// Piece stream a bundle belongs to.
///
/// Each classification has its own hardware counter, its own "bundle done"
/// flag and its own numbering rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Pieces that passed inspection ("OK" stream).
    Passed,
    /// Pieces flagged for non-destructive testing ("NDT" stream).
    Ndt,
}

impl Classification {
    /// Both classifications in processing order.
    pub const ALL: [Classification; 2] = [Classification::Passed, Classification::Ndt];

    /// Stable index for per-classification arrays.
    pub fn index(self) -> usize {
        match self {
            Classification::Passed => 0,
            Classification::Ndt => 1,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Passed => write!(f, "OK"),
            Classification::Ndt => write!(f, "NDT"),
        }
    }
}

impl std::str::FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ok" | "passed" => Ok(Classification::Passed),
            "ndt" => Ok(Classification::Ndt),
            other => Err(format!("unknown classification '{other}' (expected 'ok' or 'ndt')")),
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// Bundle lifecycle: Active → Completed → Printed, never reversed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    /// Accepting pieces.
    Active,
    /// Closed (full or partial), waiting for its tag.
    Completed,
    /// Tag printed. Terminal.
    Printed,
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleStatus::Active => write!(f, "Active"),
            BundleStatus::Completed => write!(f, "Completed"),
            BundleStatus::Printed => write!(f, "Printed"),
        }
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// A group of physically bundled pipe pieces tracked as one printable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    /// Ledger identifier (0 until the store assigns one)
    pub id: BundleId,
    pub classification: Classification,
    /// Owning production order
    pub order_id: u64,
    /// Owning material run, if the order is slit-tracked
    pub slit_id: Option<u64>,
    /// Unique, monotonically increasing within the classification
    pub bundle_no: String,
    pub batch_no: String,
    pub piece_count: u32,
    pub weight_kg: f64,
    pub status: BundleStatus,
    /// True only when closed at exactly the resolved threshold
    pub is_full: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set when an operator "bundle done" signal closed or released the bundle
    #[serde(default)]
    pub operator_done_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_bundle_id: Option<BundleId>,
}

impl Bundle {
    /// Open a new, empty Active bundle.
    pub fn open(
        classification: Classification,
        order_id: u64,
        slit_id: Option<u64>,
        bundle_no: String,
        batch_no: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            classification,
            order_id,
            slit_id,
            bundle_no,
            batch_no,
            piece_count: 0,
            weight_kg: 0.0,
            status: BundleStatus::Active,
            is_full: false,
            started_at: now,
            ended_at: None,
            operator_done_at: None,
            parent_bundle_id: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BundleStatus::Active
    }

    /// Full Completed bundles are picked up by periodic discovery.
    pub fn is_printable(&self) -> bool {
        self.status == BundleStatus::Completed && self.is_full
    }

    /// Completed bundles holding pieces may be released explicitly.
    pub fn is_releasable(&self) -> bool {
        self.status == BundleStatus::Completed && self.piece_count > 0
    }

    /// Add pieces and recompute weight.
    pub fn add_pieces(&mut self, pieces: u32, piece_weight_kg: f64) {
        self.piece_count += pieces;
        self.weight_kg = f64::from(self.piece_count) * piece_weight_kg;
    }

    /// Close the bundle. Only Active bundles move; returns whether it did.
    pub fn complete(&mut self, full: bool, now: DateTime<Utc>) -> bool {
        if self.status != BundleStatus::Active {
            return false;
        }
        self.status = BundleStatus::Completed;
        self.is_full = full;
        self.ended_at = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bundle {
        Bundle::open(
            Classification::Passed,
            7,
            Some(70),
            "261OK0001".to_string(),
            "ORD7_2610001".to_string(),
            Utc::now(),
        )
    }

    #[test]
    fn test_add_pieces_updates_weight() {
        let mut b = sample();
        b.add_pieces(4, 12.5);
        b.add_pieces(2, 12.5);
        assert_eq!(b.piece_count, 6);
        assert!((b.weight_kg - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_complete_only_from_active() {
        let mut b = sample();
        assert!(b.complete(true, Utc::now()));
        assert_eq!(b.status, BundleStatus::Completed);
        assert!(b.is_full);
        // Second close is refused and does not flip the full flag
        assert!(!b.complete(false, Utc::now()));
        assert!(b.is_full);
    }

    #[test]
    fn test_printable_vs_releasable() {
        let mut partial = sample();
        partial.add_pieces(4, 0.0);
        partial.complete(false, Utc::now());
        assert!(!partial.is_printable());
        assert!(partial.is_releasable());

        let mut empty = sample();
        empty.complete(false, Utc::now());
        assert!(!empty.is_releasable());
    }

    #[test]
    fn test_classification_parse_and_display() {
        assert_eq!("ok".parse::<Classification>(), Ok(Classification::Passed));
        assert_eq!("NDT".parse::<Classification>(), Ok(Classification::Ndt));
        assert!("bad".parse::<Classification>().is_err());
        assert_eq!(Classification::Ndt.to_string(), "NDT");
    }
}
