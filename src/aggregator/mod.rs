/// Sliding window of request outcomes
pub mod error_window;

pub use error_window::{SlidingErrorWindow, DEFAULT_WINDOW_SIZE};
