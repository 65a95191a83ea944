//! Fetch generations: "cancel" a fetch by ignoring its result.
//!
//! Every logical fetch captures a [`Generation`] when it starts and checks
//! [`GenerationTracker::is_current`] after each await point. Once a newer
//! generation exists the older fetch abandons whatever it was about to apply.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Monotonic generation counter for one data stream.
#[derive(Debug, Default)]
pub struct GenerationTracker {
    latest: AtomicU64,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, superseding every earlier one.
    pub fn next(&self) -> Generation {
        Generation(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> Generation {
        Generation(self.latest.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.latest.load(Ordering::SeqCst) == generation.0
    }

    /// Supersedes everything in flight without starting new work.
    pub fn invalidate(&self) {
        self.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_is_monotonic_and_current() {
        let tracker = GenerationTracker::new();
        let g1 = tracker.next();
        assert!(tracker.is_current(g1));

        let g2 = tracker.next();
        assert!(g2 > g1);
        assert!(!tracker.is_current(g1));
        assert!(tracker.is_current(g2));
        assert_eq!(tracker.current(), g2);
    }

    #[test]
    fn test_invalidate_supersedes_in_flight() {
        let tracker = GenerationTracker::new();
        let g1 = tracker.next();
        tracker.invalidate();
        assert!(!tracker.is_current(g1));
        assert_eq!(tracker.current().value(), 2);
    }
}
