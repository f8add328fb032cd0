//! Prometheus metrics exporter for scanner monitoring.
//!
//! # Metrics Exposed
//!
//! - `qr_scanner_frames_captured_total` - Frames captured from the camera
//! - `qr_scanner_frames_skipped_total` - Polls with no frame (not ready or capture error)
//! - `qr_scanner_decode_attempts_total` - Decode attempts
//! - `qr_scanner_codes_decoded_total` - Codes decoded
//! - `qr_scanner_sessions_started_total` - Scan sessions started
//! - `qr_scanner_scan_state` - State of the latest session
//!
//! # Example
//!
//! ```no_run
//! use qr_scanner::metrics::MetricsRegistry;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.record_session_started();
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
