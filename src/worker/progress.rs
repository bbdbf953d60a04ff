//! Per-job progress counter.

/// Non-decreasing percentage derived from completed units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTracker {
    total_units: usize,
    units_done: usize,
    last_reported: u8,
}

impl ProgressTracker {
    pub fn new(total_units: usize) -> Self {
        Self {
            total_units,
            units_done: 0,
            last_reported: 0,
        }
    }

    pub fn total_units(&self) -> usize {
        self.total_units
    }

    pub fn units_done(&self) -> usize {
        self.units_done
    }

    pub fn is_complete(&self) -> bool {
        self.units_done >= self.total_units
    }

    /// Current percentage, floored. An empty outline counts as complete.
    pub fn percent(&self) -> u8 {
        if self.total_units == 0 {
            return 100;
        }
        let done = self.units_done.min(self.total_units);
        ((done * 100) / self.total_units) as u8
    }

    /// Mark one unit done and return the value to persist.
    pub fn advance(&mut self) -> u8 {
        self.units_done = (self.units_done + 1).min(self.total_units);
        self.last_reported = self.last_reported.max(self.percent());
        self.last_reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_and_reaches_100_on_last_unit() {
        let mut progress = ProgressTracker::new(3);
        assert_eq!(progress.advance(), 33);
        assert_eq!(progress.advance(), 66);
        assert!(!progress.is_complete());
        assert_eq!(progress.advance(), 100);
        assert!(progress.is_complete());
    }

    #[test]
    fn never_exceeds_100_or_decreases() {
        let mut progress = ProgressTracker::new(7);
        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(progress.advance());
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100);
        assert_eq!(seen.iter().filter(|p| **p == 100).count(), 4);
        assert_eq!(seen[5], 85);
    }

    #[test]
    fn empty_outline_is_complete() {
        let progress = ProgressTracker::new(0);
        assert!(progress.is_complete());
        assert_eq!(progress.percent(), 100);
    }
}
