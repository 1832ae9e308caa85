use crate::alerts::Notifier;
use crate::events::{AlertEvent, AlertKind};
use log::{error, info};

/// Delivery counters kept by the alert manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub sent: u64,
    pub suppressed: u64,
    pub failed: u64,
}

/// Gatekeeper between the detectors and the notifier
///
/// In maintenance mode only `Critical` alerts go out. Delivery failures are
/// logged and swallowed so that notification problems never disrupt log
/// ingestion; the caller only learns whether the alert was delivered.
pub struct AlertManager {
    /// Where alerts are delivered
    notifier: Box<dyn Notifier>,
    /// Suppress everything except critical alerts
    maintenance_mode: bool,
    stats: DeliveryStats,
}

impl AlertManager {
    /// Create a new alert manager
    ///
    /// # Arguments
    ///
    /// * `notifier` - Delivery channel
    /// * `maintenance_mode` - Whether non-critical alerts are suppressed
    pub fn new(notifier: Box<dyn Notifier>, maintenance_mode: bool) -> Self {
        Self {
            notifier,
            maintenance_mode,
            stats: DeliveryStats::default(),
        }
    }

    /// Deliver an alert, once, without retrying
    ///
    /// # Returns
    ///
    /// `true` if the notifier accepted the alert, `false` if it was suppressed
    /// by maintenance mode or delivery failed
    pub fn dispatch(&mut self, alert: &AlertEvent) -> bool {
        info!("Attempting to send {} alert", alert.kind);

        if self.maintenance_mode && alert.kind != AlertKind::Critical {
            info!("Maintenance mode: suppressing {} alert", alert.kind);
            self.stats.suppressed += 1;
            return false;
        }

        match self.notifier.send(alert) {
            Ok(()) => {
                info!("{} alert sent successfully", alert.kind);
                self.stats.sent += 1;
                true
            }
            Err(e) => {
                error!("Failed to send {} alert: {}", alert.kind, e);
                self.stats.failed += 1;
                false
            }
        }
    }

    pub fn is_maintenance_mode(&self) -> bool {
        self.maintenance_mode
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }
}
