//! Pieces-per-bundle lookup from the formation chart

use crate::config::defaults::{DEFAULT_PIECES_PER_BUNDLE, PIPE_SIZE_TOLERANCE};
use crate::types::FormationChartEntry;

/// Resolves the bundle threshold for a (mill, pipe size) pair.
///
/// Order of preference: active exact-size row, active mill default row,
/// then the hard-coded fallback. Sizes compare numerically, so "4.50"
/// matches a 4.5 row.
#[derive(Debug, Clone)]
pub struct ThresholdResolver {
    entries: Vec<FormationChartEntry>,
    fallback: u32,
}

impl ThresholdResolver {
    pub fn new(entries: Vec<FormationChartEntry>) -> Self {
        Self {
            entries,
            fallback: DEFAULT_PIECES_PER_BUNDLE,
        }
    }

    pub fn with_fallback(mut self, fallback: u32) -> Self {
        self.fallback = fallback.max(1);
        self
    }

    pub fn fallback(&self) -> u32 {
        self.fallback
    }

    pub fn resolve(&self, mill_id: u32, pipe_size: &str) -> u32 {
        let active = || {
            self.entries
                .iter()
                .filter(move |e| e.active && e.mill_id == mill_id && e.pieces_per_bundle > 0)
        };

        if let Ok(size) = pipe_size.trim().parse::<f64>() {
            let exact = active().find(|e| {
                e.pipe_size
                    .is_some_and(|s| (s - size).abs() < PIPE_SIZE_TOLERANCE)
            });
            if let Some(entry) = exact {
                return entry.pieces_per_bundle;
            }
        }

        if let Some(entry) = active().find(|e| e.is_default()) {
            return entry.pieces_per_bundle;
        }

        tracing::debug!(mill_id, pipe_size, fallback = self.fallback, "No chart entry, using fallback threshold");
        self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart() -> ThresholdResolver {
        ThresholdResolver::new(vec![
            FormationChartEntry::new(1, None, 20),
            FormationChartEntry::new(1, Some(4.5), 10),
            FormationChartEntry {
                mill_id: 1,
                pipe_size: Some(6.0),
                pieces_per_bundle: 7,
                active: false,
            },
            FormationChartEntry::new(2, Some(4.5), 9),
        ])
    }

    #[test]
    fn test_exact_match_preferred() {
        assert_eq!(chart().resolve(1, "4.5"), 10);
        assert_eq!(chart().resolve(1, "4.50"), 10);
    }

    #[test]
    fn test_default_entry_used_when_size_unknown() {
        assert_eq!(chart().resolve(1, "8.625"), 20);
        // Inactive rows never match
        assert_eq!(chart().resolve(1, "6"), 20);
        // Unparsable size skips exact match
        assert_eq!(chart().resolve(1, "n/a"), 20);
    }

    #[test]
    fn test_fallback_when_mill_has_no_default() {
        assert_eq!(chart().resolve(2, "3.5"), DEFAULT_PIECES_PER_BUNDLE);
        assert_eq!(chart().resolve(99, "4.5"), 13);
        assert_eq!(chart().with_fallback(8).resolve(99, ""), 8);
    }
}
