/// Error types for the pool watcher
pub mod error;

/// Core data types: log records, pool identities and alerts
pub mod events;

/// Pool and status classification of access log records
pub mod classifiers;

/// Sliding window of recent request outcomes
pub mod aggregator;

/// Failover and error-rate detection
pub mod detectors;

/// Alert manager and notifications
pub mod alerts;

/// Log file followers
pub mod collectors;

/// Configuration management
pub mod config;

/// Log ingestion loop
pub mod watcher;

// Re-export commonly used types
pub use error::{AlertError, CollectorError, ConfigError, WatchError};
pub use events::{AlertEvent, AlertKind, LogRecord, PoolIdentity, Timestamp};
pub use watcher::{Watcher, WatcherStats};
