/// Pool inference from upstream addresses
pub mod pool;

/// Error verdicts from status fields
pub mod status;

pub use pool::{KnownAddresses, PoolClassifier, PoolRule};
pub use status::{is_error, status_code, upstream_status_text};
