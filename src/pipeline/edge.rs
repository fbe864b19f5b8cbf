//! Rising-edge detection on polled boolean signals

/// Transition observed between two consecutive samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Steady,
}

/// Compares each sample against the previous tick's value.
///
/// Starts low, so a signal already high on the first sample reports
/// `Rising` once; the caller decides whether that tick may act on it.
#[derive(Debug, Default, Clone)]
pub struct EdgeDetector {
    last: bool,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, current: bool) -> Edge {
        let edge = match (self.last, current) {
            (false, true) => Edge::Rising,
            (true, false) => Edge::Falling,
            _ => Edge::Steady,
        };
        self.last = current;
        edge
    }

    pub fn reset(&mut self) {
        self.last = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_fire_once_per_transition() {
        let mut d = EdgeDetector::new();
        assert_eq!(d.update(false), Edge::Steady);
        assert_eq!(d.update(true), Edge::Rising);
        assert_eq!(d.update(true), Edge::Steady);
        assert_eq!(d.update(false), Edge::Falling);
        assert_eq!(d.update(true), Edge::Rising);
    }

    #[test]
    fn test_reset_returns_to_low() {
        let mut d = EdgeDetector::new();
        d.update(true);
        d.reset();
        assert_eq!(d.update(true), Edge::Rising);
    }
}
