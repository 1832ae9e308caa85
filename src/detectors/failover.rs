//! Failover detection
//!
//! Tracks which pool is serving live traffic and emits an alert when traffic
//! moves to the other pool, at most once per cooldown period.

use crate::alerts::Cooldown;
use crate::events::{AlertDetail, AlertEvent, AlertKind, PoolIdentity, Timestamp};
use log::{info, warn};

/// Detects shifts of live traffic between the blue and green pools
///
/// `last_known_pool` only moves on an alerted transition. A change observed
/// inside the cooldown is logged and ignored, so the next observation is still
/// compared against the last pool that was reported.
#[derive(Debug, Clone)]
pub struct FailoverDetector {
    last_known_pool: PoolIdentity,
    cooldown: Cooldown,
    suppressed: u64,
}

impl FailoverDetector {
    /// Create a detector starting from the configured active pool
    pub fn new(active_pool: PoolIdentity, cooldown: Cooldown) -> Self {
        Self {
            last_known_pool: active_pool,
            cooldown,
            suppressed: 0,
        }
    }

    /// Feed the pool that served one request
    ///
    /// Returns a `Failover` alert when the pool differs from the last reported
    /// one and the cooldown has elapsed.
    pub fn observe(&mut self, pool: PoolIdentity, now: Timestamp) -> Option<AlertEvent> {
        if !pool.is_known() || pool == self.last_known_pool {
            return None;
        }

        if self.cooldown.is_active(now) {
            self.suppressed += 1;
            let elapsed = self
                .cooldown
                .elapsed(now)
                .map(|d| d.num_seconds())
                .unwrap_or_default();
            warn!(
                "Failover detected ({} -> {}) but in cooldown ({}s / {}s)",
                self.last_known_pool,
                pool,
                elapsed,
                self.cooldown.period().num_seconds()
            );
            return None;
        }

        let previous = self.last_known_pool;
        self.last_known_pool = pool;
        self.cooldown.record(now);

        info!("*** FAILOVER DETECTED *** {} -> {}", previous, pool);

        Some(
            AlertEvent::new(AlertKind::Failover, Self::format_message(previous, pool, now), now)
                .with_detail(AlertDetail::Failover {
                    from: previous,
                    to: pool,
                }),
        )
    }

    /// Pool named by the most recent failover alert, or the initial active pool
    pub fn last_known_pool(&self) -> PoolIdentity {
        self.last_known_pool
    }

    /// Number of pool changes ignored because of the cooldown
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed
    }

    fn format_message(previous: PoolIdentity, current: PoolIdentity, now: Timestamp) -> String {
        format!(
            "*Failover Detected*\n\n\
             • Previous Pool: `{previous}`\n\
             • Current Pool: `{current}`\n\
             • Timestamp: {}\n\n\
             *Action Required:*\n\
             1. Check health of `{previous}` container\n\
             2. Review logs for errors\n\
             3. Verify `{current}` is handling traffic correctly",
            now.format("%Y-%m-%d %H:%M:%S")
        )
    }
}
