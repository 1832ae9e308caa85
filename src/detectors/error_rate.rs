//! Error-rate detection over the sliding request window

use crate::aggregator::SlidingErrorWindow;
use crate::alerts::Cooldown;
use crate::events::{AlertDetail, AlertEvent, AlertKind, PoolIdentity, Timestamp};
use log::{debug, warn};

/// Default error-rate threshold in percent
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 2.0;

/// Default number of samples required before the rate is evaluated
pub const DEFAULT_MIN_SAMPLES: usize = 20;

/// Alerts when the windowed error rate exceeds a threshold
///
/// Every evaluation is derived from the window contents alone; the only state
/// kept between evaluations is the cooldown.
#[derive(Debug, Clone)]
pub struct ErrorRateDetector {
    /// Rate above which an alert fires (strictly greater)
    threshold_percent: f64,
    /// Minimum window fill before a verdict is trusted
    min_samples: usize,
    cooldown: Cooldown,
}

impl ErrorRateDetector {
    pub fn new(threshold_percent: f64, min_samples: usize, cooldown: Cooldown) -> Self {
        Self {
            threshold_percent,
            min_samples,
            cooldown,
        }
    }

    /// Create a detector with the default threshold (2%) and sample floor (20)
    pub fn with_defaults(cooldown: Cooldown) -> Self {
        Self::new(DEFAULT_THRESHOLD_PERCENT, DEFAULT_MIN_SAMPLES, cooldown)
    }

    /// Evaluate the window at `now`
    ///
    /// # Arguments
    ///
    /// * `window` - Recent request outcomes
    /// * `now` - Evaluation time, used for the cooldown
    /// * `current_pool` - Pool named in the alert message
    pub fn evaluate(
        &mut self,
        window: &SlidingErrorWindow,
        now: Timestamp,
        current_pool: PoolIdentity,
    ) -> Option<AlertEvent> {
        if window.len() < self.min_samples {
            return None;
        }

        let rate = window.error_rate_percent();
        if rate <= self.threshold_percent {
            return None;
        }

        if self.cooldown.is_active(now) {
            debug!(
                "Error rate {:.2}% above threshold but in cooldown",
                rate
            );
            return None;
        }

        self.cooldown.record(now);

        warn!(
            "*** HIGH ERROR RATE *** {:.2}% (threshold: {}%)",
            rate, self.threshold_percent
        );

        let errors = window.error_count();
        let total = window.len();
        let message = format!(
            "*High Error Rate Detected*\n\n\
             • Error Rate: `{rate:.2}%` (threshold: {}%)\n\
             • Errors: {errors}/{total} requests\n\
             • Window Size: {} requests\n\
             • Current Pool: `{current_pool}`\n\n\
             *Action Required:*\n\
             1. Check upstream application logs\n\
             2. Verify database/external service connectivity\n\
             3. Consider manual pool toggle if issues persist",
            self.threshold_percent,
            window.capacity(),
        );

        Some(
            AlertEvent::new(AlertKind::ErrorRate, message, now).with_detail(AlertDetail::ErrorRate {
                rate_percent: rate,
                errors,
                total,
                window_capacity: window.capacity(),
            }),
        )
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }
}
