//! Log ingestion loop
//!
//! The `Watcher` owns every piece of mutable detection state (the sliding
//! window and both detectors) and is driven one line at a time, so no locking
//! is needed. Alerts are dispatched synchronously through the `AlertManager`,
//! whose notifier bounds each delivery with a timeout.

use crate::aggregator::SlidingErrorWindow;
use crate::alerts::{AlertManager, Cooldown, Notifier};
use crate::classifiers::{is_error, status_code, upstream_status_text, PoolClassifier};
use crate::config::Config;
use crate::detectors::{ErrorRateDetector, FailoverDetector};
use crate::error::{CollectorError, WatchError};
use crate::events::{AlertEvent, AlertKind, LogRecord, PoolIdentity, Timestamp};
use chrono::Utc;
use log::{debug, info};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// How often the loop wakes up to check for shutdown when no lines arrive
const RECV_TICK: Duration = Duration::from_millis(100);

/// Records between progress log lines
const PROGRESS_EVERY: u64 = 10;

/// Counters for everything the watcher has seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    /// Records parsed and fed to the detectors
    pub processed: u64,
    /// Lines that were not JSON objects, or were empty ones
    pub dropped: u64,
    /// Records classified as errors
    pub errors: u64,
    /// Alerts emitted by the detectors
    pub alerts: u64,
}

/// Streaming blue/green log analysis engine
pub struct Watcher {
    classifier: PoolClassifier,
    window: SlidingErrorWindow,
    failover: FailoverDetector,
    error_rate: ErrorRateDetector,
    alert_manager: AlertManager,
    min_samples: usize,
    stats: WatcherStats,
}

impl Watcher {
    /// Build the engine from configuration and a notifier
    pub fn new(config: &Config, notifier: Box<dyn Notifier>) -> Self {
        Self {
            classifier: PoolClassifier::new(&config.known_addresses()),
            window: SlidingErrorWindow::new(config.window_size),
            failover: FailoverDetector::new(
                config.active_pool,
                Cooldown::from_secs(config.alert_cooldown_secs),
            ),
            error_rate: ErrorRateDetector::new(
                config.error_rate_threshold,
                config.min_samples,
                Cooldown::from_secs(config.alert_cooldown_secs),
            ),
            alert_manager: AlertManager::new(notifier, config.maintenance_mode),
            min_samples: config.min_samples,
            stats: WatcherStats::default(),
        }
    }

    /// Announce that monitoring is active
    ///
    /// Sent as an `Info` alert, so maintenance mode suppresses it like any other
    /// non-critical notice.
    pub fn announce_startup(&mut self, now: Timestamp) -> bool {
        let alert = AlertEvent::new(
            AlertKind::Info,
            format!(
                "*Watcher Started*\n\nMonitoring is now active.\nInitial pool: `{}`",
                self.failover.last_known_pool()
            ),
            now,
        );
        self.alert_manager.dispatch(&alert)
    }

    /// Report a fatal ingestion error as a critical alert
    pub fn announce_fatal(&mut self, err: &WatchError, now: Timestamp) -> bool {
        let alert = AlertEvent::new(
            AlertKind::Critical,
            format!("*Watcher Stopped*\n\nFatal error: {}", err),
            now,
        );
        self.alert_manager.dispatch(&alert)
    }

    /// Process one raw log line
    ///
    /// Lines that are not JSON objects, or are empty objects, are dropped
    /// without error.
    ///
    /// # Returns
    ///
    /// The alerts emitted for this line, after they were handed to the notifier
    pub fn process_line(&mut self, line: &str, now: Timestamp) -> Vec<AlertEvent> {
        if line.trim().is_empty() {
            return Vec::new();
        }
        match LogRecord::from_json(line) {
            Ok(record) => self.process_record(&record, now),
            Err(e) => {
                self.stats.dropped += 1;
                debug!("Skipping unparsable log line '{}': {}", line, e);
                Vec::new()
            }
        }
    }

    /// Feed one parsed record through classification and both detectors
    pub fn process_record(&mut self, record: &LogRecord, now: Timestamp) -> Vec<AlertEvent> {
        self.stats.processed += 1;

        let pool = record
            .declared_pool()
            .unwrap_or_else(|| self.classifier.classify(record.upstream_addr().as_deref()));

        let status = record.status.as_ref().and_then(status_code);
        let upstream_status = record.upstream_status.as_ref().and_then(upstream_status_text);

        if self.stats.processed % PROGRESS_EVERY == 0 {
            debug!(
                "Processed {} requests | Pool: {} | Status: {}",
                self.stats.processed,
                pool,
                status.map_or_else(|| "-".to_string(), |s| s.to_string())
            );
        }

        let mut alerts = Vec::new();

        if let Some(alert) = self.failover.observe(pool, now) {
            alerts.push(alert);
        }

        let failed = is_error(status, upstream_status.as_deref());
        if failed {
            self.stats.errors += 1;
            info!(
                "Error detected: status={}, upstream_status={}",
                status.map_or_else(|| "-".to_string(), |s| s.to_string()),
                upstream_status.as_deref().unwrap_or("-")
            );
        }
        self.window.push(failed);

        if self.window.len() >= self.min_samples {
            if let Some(alert) =
                self.error_rate
                    .evaluate(&self.window, now, self.failover.last_known_pool())
            {
                alerts.push(alert);
            }
        }

        for alert in &alerts {
            self.stats.alerts += 1;
            self.alert_manager.dispatch(alert);
        }

        alerts
    }

    /// Consume lines until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// Returns `WatchError` if the line source disappears while no shutdown was
    /// requested; this is the only way the loop fails.
    pub fn run(&mut self, lines: &Receiver<String>, shutdown: &Receiver<()>) -> Result<(), WatchError> {
        info!("Watcher running, waiting for requests");

        loop {
            match shutdown.try_recv() {
                Ok(()) => {
                    info!("Watcher received shutdown signal");
                    return Ok(());
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }

            match lines.recv_timeout(RECV_TICK) {
                Ok(line) => {
                    self.process_line(&line, Utc::now());
                }
                Err(RecvTimeoutError::Timeout) => {
                    // No new data, check for shutdown again
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(WatchError::Collector(CollectorError::SourceClosed));
                }
            }
        }
    }

    pub fn stats(&self) -> WatcherStats {
        self.stats
    }

    pub fn window(&self) -> &SlidingErrorWindow {
        &self.window
    }

    pub fn current_pool(&self) -> PoolIdentity {
        self.failover.last_known_pool()
    }

    pub fn alert_manager(&self) -> &AlertManager {
        &self.alert_manager
    }
}
