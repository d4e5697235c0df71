//! # Hearth Telemetry
//!
//! Crate for logging and metrics of the hearth runtime.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
