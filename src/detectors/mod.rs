/// Failover and error-rate detectors
pub mod error_rate;
pub mod failover;

pub use error_rate::{ErrorRateDetector, DEFAULT_MIN_SAMPLES, DEFAULT_THRESHOLD_PERCENT};
pub use failover::FailoverDetector;
