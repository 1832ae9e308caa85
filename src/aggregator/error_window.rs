//! Sliding window of request outcomes
//!
//! Keeps the most recent N success/failure verdicts in a ring buffer together
//! with a running error count, so the error rate is available in O(1).

use std::collections::VecDeque;

/// Default number of requests kept in the window
pub const DEFAULT_WINDOW_SIZE: usize = 200;

/// Fixed-capacity window of boolean request outcomes (`true` = error)
///
/// When capacity is reached, the oldest outcome is evicted before the newest
/// is stored. `error_count` always equals the number of `true` entries held.
#[derive(Debug, Clone)]
pub struct SlidingErrorWindow {
    /// Outcomes in insertion order, oldest at the front
    outcomes: VecDeque<bool>,
    /// Maximum number of outcomes to keep
    capacity: usize,
    /// Number of `true` entries currently in `outcomes`
    error_count: usize,
}

impl SlidingErrorWindow {
    /// Create an empty window holding at most `capacity` outcomes
    ///
    /// A capacity of zero is raised to one.
    ///
    /// # Examples
    ///
    /// ```
    /// use poolwatch::aggregator::SlidingErrorWindow;
    ///
    /// let mut window = SlidingErrorWindow::new(4);
    /// window.push(true);
    /// window.push(false);
    /// assert_eq!(window.error_rate_percent(), 50.0);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
            error_count: 0,
        }
    }

    /// Record the outcome of one request
    pub fn push(&mut self, is_error: bool) {
        if self.outcomes.len() == self.capacity {
            if let Some(true) = self.outcomes.pop_front() {
                self.error_count -= 1;
            }
        }
        self.outcomes.push_back(is_error);
        if is_error {
            self.error_count += 1;
        }
    }

    /// Number of outcomes currently held
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.outcomes.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of errors currently held
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Percentage of held outcomes that are errors, 0 when empty
    pub fn error_rate_percent(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        100.0 * self.error_count as f64 / self.outcomes.len() as f64
    }

    /// Outcomes from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.outcomes.iter().copied()
    }
}

impl Default for SlidingErrorWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn window_from(capacity: u8, pushes: &[bool]) -> (SlidingErrorWindow, usize) {
        let capacity = (capacity as usize % 50) + 1;
        let mut window = SlidingErrorWindow::new(capacity);
        for &outcome in pushes {
            window.push(outcome);
        }
        (window, capacity)
    }

    // Rate over the window equals the rate over the most recent min(pushes, capacity) pushes
    #[quickcheck]
    fn prop_error_rate_matches_recent_pushes(capacity: u8, pushes: Vec<bool>) -> bool {
        let (window, capacity) = window_from(capacity, &pushes);

        let kept = pushes.len().min(capacity);
        let recent = &pushes[pushes.len() - kept..];
        let errors = recent.iter().filter(|&&e| e).count();
        let expected = if kept == 0 {
            0.0
        } else {
            100.0 * errors as f64 / kept as f64
        };

        (window.error_rate_percent() - expected).abs() < 1e-9
    }

    // The window keeps exactly the most recent `capacity` outcomes in order
    #[quickcheck]
    fn prop_ring_keeps_most_recent(capacity: u8, pushes: Vec<bool>) -> bool {
        let (window, capacity) = window_from(capacity, &pushes);

        let kept = pushes.len().min(capacity);
        let expected = pushes[pushes.len() - kept..].to_vec();
        let held: Vec<bool> = window.iter().collect();

        held == expected && window.len() <= window.capacity()
    }

    // The running count always matches the contents
    #[quickcheck]
    fn prop_error_count_consistent(capacity: u8, pushes: Vec<bool>) -> bool {
        let (window, _) = window_from(capacity, &pushes);
        window.error_count() == window.iter().filter(|&e| e).count()
    }
}
