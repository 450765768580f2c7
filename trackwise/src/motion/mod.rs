//! Motion classification.
//!
//! Turns raw motion-sensor and position samples into a stable
//! [`MotionState`] using sliding-window statistics and asymmetric hysteresis.
//!
//! # Architecture
//!
//! ```text
//! MotionInput ──► MotionService ──► MotionClassifier ──► MotionTransition
//! (sensor/fix)    (event loop +      (windows, threshold   (broadcast + watch)
//!                  confirm timer)     table, hysteresis)
//! ```

mod classifier;
mod service;
mod types;
mod window;

pub use classifier::{MotionClassifier, MotionConfig, DEFAULT_WINDOW_SIZE};
pub use service::{MotionHandle, MotionService};
pub use types::{MotionInput, MotionSample, MotionState, MotionTransition, PositionSample};
pub use window::SlidingWindow;
