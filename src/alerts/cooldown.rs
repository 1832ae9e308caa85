use crate::events::Timestamp;
use chrono::Duration;

/// Minimum spacing between two alerts from the same detector
///
/// Only alerts that were actually emitted are recorded; a suppressed attempt
/// leaves the timer untouched.
#[derive(Debug, Clone)]
pub struct Cooldown {
    /// Minimum time between alerts
    period: Duration,
    /// When the last alert was emitted, if ever
    last_alert: Option<Timestamp>,
}

impl Default for Cooldown {
    fn default() -> Self {
        Self::new(Duration::seconds(300)) // Default: 5 minutes
    }
}

impl Cooldown {
    /// Create a cooldown gate with the given period
    ///
    /// # Arguments
    ///
    /// * `period` - Minimum time between two alerts
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_alert: None,
        }
    }

    /// Create a cooldown gate from a period in seconds
    pub fn from_secs(secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        Self::new(Duration::seconds(secs))
    }

    /// Check whether an alert at `now` would fall inside the cooldown period
    ///
    /// # Returns
    ///
    /// `true` if the previous alert was less than `period` before `now`
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.remaining(now).is_some()
    }

    /// Time since the last emitted alert, if any
    pub fn elapsed(&self, now: Timestamp) -> Option<Duration> {
        self.last_alert.map(|last| now - last)
    }

    /// Time left before another alert may be emitted, `None` if not cooling down
    pub fn remaining(&self, now: Timestamp) -> Option<Duration> {
        let elapsed = self.elapsed(now)?;
        if elapsed < self.period {
            Some(self.period - elapsed)
        } else {
            None
        }
    }

    /// Record that an alert was emitted at `timestamp`
    pub fn record(&mut self, timestamp: Timestamp) {
        self.last_alert = Some(timestamp);
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn last_alert(&self) -> Option<Timestamp> {
        self.last_alert
    }
}
