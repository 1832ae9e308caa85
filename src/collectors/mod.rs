/// Follows the proxy access log and forwards new lines
pub mod tail_collector;

pub use tail_collector::TailCollector;
