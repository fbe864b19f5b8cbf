//! Cumulative cut counter → per-tick delta

use crate::types::Classification;

/// Tracks the last observed cumulative counter per classification.
///
/// The first sample after construction or `reset` only sets the baseline;
/// cuts made before attach are never replayed. A decrease (controller
/// restart, counter wrap) resynchronises the baseline and yields zero.
#[derive(Debug, Default, Clone)]
pub struct CutCounterTracker {
    last: [Option<i64>; 2],
}

impl CutCounterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw reading and get the number of new cuts.
    pub fn sample(&mut self, classification: Classification, current: i64) -> u32 {
        if current < 0 {
            tracing::warn!(%classification, current, "Rejecting negative counter reading");
            return 0;
        }

        let slot = &mut self.last[classification.index()];
        let Some(last) = *slot else {
            tracing::info!(%classification, baseline = current, "Counter baseline initialised");
            *slot = Some(current);
            return 0;
        };

        *slot = Some(current);
        if current < last {
            tracing::warn!(%classification, last, current, "Counter decreased, resynchronising baseline");
            return 0;
        }

        u32::try_from(current - last).unwrap_or(u32::MAX)
    }

    pub fn baseline(&self, classification: Classification) -> Option<i64> {
        self.last[classification.index()]
    }

    /// Forget both baselines; the next samples re-initialise them.
    pub fn reset(&mut self) {
        self.last = [None, None];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_sets_baseline_only() {
        let mut t = CutCounterTracker::new();
        assert_eq!(t.sample(Classification::Passed, 500), 0);
        assert_eq!(t.sample(Classification::Passed, 503), 3);
        assert_eq!(t.sample(Classification::Passed, 503), 0);
    }

    #[test]
    fn test_decrease_resyncs() {
        let mut t = CutCounterTracker::new();
        t.sample(Classification::Ndt, 100);
        assert_eq!(t.sample(Classification::Ndt, 10), 0);
        assert_eq!(t.baseline(Classification::Ndt), Some(10));
        assert_eq!(t.sample(Classification::Ndt, 12), 2);
    }

    #[test]
    fn test_negative_reading_leaves_baseline() {
        let mut t = CutCounterTracker::new();
        t.sample(Classification::Passed, 40);
        assert_eq!(t.sample(Classification::Passed, -1), 0);
        assert_eq!(t.baseline(Classification::Passed), Some(40));
    }

    #[test]
    fn test_classifications_independent_and_reset() {
        let mut t = CutCounterTracker::new();
        t.sample(Classification::Passed, 1);
        assert_eq!(t.baseline(Classification::Ndt), None);
        t.reset();
        assert_eq!(t.sample(Classification::Passed, 50), 0);
    }
}
