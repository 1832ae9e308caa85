/// Configuration loading and validation
pub mod conf;

pub use conf::{Config, DEFAULT_LOG_FILE};
