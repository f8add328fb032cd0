//! Metrics collection and registry.

use crate::scan::ScanState;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric creation, registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A point-in-time copy of the scanner counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Frames successfully captured.
    pub frames_captured: u64,
    /// Polls that produced no frame.
    pub frames_skipped: u64,
    /// Decode attempts made.
    pub decode_attempts: u64,
    /// Codes successfully decoded.
    pub codes_decoded: u64,
    /// Scan sessions started.
    pub sessions_started: u64,
    /// Numeric [`ScanState`] of the most recent session.
    pub scan_state: i64,
}

/// Prometheus metrics registry for scanner monitoring.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,

    // Capture metrics
    frames_captured: IntCounter,
    frames_skipped: IntCounter,

    // Decode metrics
    decode_attempts: IntCounter,
    codes_decoded: IntCounter,

    // Session metrics
    sessions_started: IntCounter,
    scan_state: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all scanner metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_captured = IntCounter::new(
            "qr_scanner_frames_captured_total",
            "Total frames captured from the camera",
        )?;
        let frames_skipped = IntCounter::new(
            "qr_scanner_frames_skipped_total",
            "Polls skipped because no frame was ready or capture failed",
        )?;
        let decode_attempts = IntCounter::new(
            "qr_scanner_decode_attempts_total",
            "Total decode attempts",
        )?;
        let codes_decoded = IntCounter::new(
            "qr_scanner_codes_decoded_total",
            "Total QR codes successfully decoded",
        )?;
        let sessions_started = IntCounter::new(
            "qr_scanner_sessions_started_total",
            "Total scan sessions started",
        )?;
        let scan_state = IntGauge::new(
            "qr_scanner_scan_state",
            "Scan state (0=scanning, 1=delivering, 2=cooldown, 3=terminated)",
        )?;

        registry.register(Box::new(frames_captured.clone()))?;
        registry.register(Box::new(frames_skipped.clone()))?;
        registry.register(Box::new(decode_attempts.clone()))?;
        registry.register(Box::new(codes_decoded.clone()))?;
        registry.register(Box::new(sessions_started.clone()))?;
        registry.register(Box::new(scan_state.clone()))?;

        Ok(Self {
            registry,
            frames_captured,
            frames_skipped,
            decode_attempts,
            codes_decoded,
            sessions_started,
            scan_state,
        })
    }

    /// Counts a frame handed to the decoder.
    pub fn record_frame_captured(&self) {
        self.frames_captured.inc();
    }

    /// Counts a poll that produced no usable frame.
    pub fn record_frame_skipped(&self) {
        self.frames_skipped.inc();
    }

    /// Counts a decode attempt.
    pub fn record_decode_attempt(&self) {
        self.decode_attempts.inc();
    }

    /// Counts a successfully decoded code.
    pub fn record_code_decoded(&self) {
        self.codes_decoded.inc();
    }

    /// Counts a started scan session.
    pub fn record_session_started(&self) {
        self.sessions_started.inc();
    }

    /// Publishes the current scan state.
    pub fn set_state(&self, state: ScanState) {
        self.scan_state.set(state.code());
    }

    /// Reads every metric into a plain struct.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_captured: self.frames_captured.get(),
            frames_skipped: self.frames_skipped.get(),
            decode_attempts: self.decode_attempts.get(),
            codes_decoded: self.codes_decoded.get(),
            sessions_started: self.sessions_started.get(),
            scan_state: self.scan_state.get(),
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
