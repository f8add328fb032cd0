//! The scan loop: poll, capture, decode, deliver.
//!
//! ```text
//! Scanning ──decode ok──▶ Delivering ──Resume──▶ Cooldown ──▶ Scanning
//!    ▲  │                      │
//!    └──┘ no frame / no code   └──Stop / cancel──▶ Terminated
//! ```
//!
//! Capture and decode attempts are strictly sequential: one frame is
//! captured, decoded and dropped before the next poll.

use super::cancel::CancelToken;
use super::sink::{AfterDelivery, ResultSink};
use crate::capture::{ScanConfig, SharedCamera};
use crate::decode::{DecodedResult, Decoder};
use crate::metrics::MetricsRegistry;
use std::sync::{Arc, Mutex, PoisonError};

/// Lifecycle state of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanState {
    /// Polling the camera and decoding frames.
    Scanning,
    /// Handing a result to the sink.
    Delivering,
    /// Pausing after a continuous-mode delivery.
    Cooldown,
    /// Finished; never left once entered.
    Terminated,
}

impl ScanState {
    /// Numeric code used for the state gauge.
    pub fn code(self) -> i64 {
        match self {
            ScanState::Scanning => 0,
            ScanState::Delivering => 1,
            ScanState::Cooldown => 2,
            ScanState::Terminated => 3,
        }
    }
}

/// Shared, observable view of a loop's [`ScanState`].
#[derive(Debug, Clone)]
pub struct StateHandle {
    state: Arc<Mutex<ScanState>>,
}

impl StateHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScanState::Scanning)),
        }
    }

    /// Current state.
    pub fn get(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, next: ScanState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *state;
        if current == ScanState::Terminated || current == next {
            return false;
        }
        tracing::debug!(from = ?current, to = ?next, "Scan state transition");
        *state = next;
        true
    }
}

/// How a finished session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A result was delivered and the sink asked to stop.
    Delivered,
    /// The session was cancelled before delivering a final result.
    Cancelled,
}

/// Result of one scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The camera is not open; nothing was captured.
    CameraClosed,
    /// The camera had no new frame.
    NotReady,
    /// The camera reported a capture error.
    CaptureFailed,
    /// A frame was decoded but held no code.
    NoCode,
    /// A code was delivered; the sink chose what happens next.
    Delivered(AfterDelivery),
    /// Cancellation was observed; nothing was delivered.
    Cancelled,
}

/// A single-session scan loop.
pub struct ScanLoop<D> {
    camera: SharedCamera,
    decoder: D,
    sink: Box<dyn ResultSink>,
    cancel: CancelToken,
    config: ScanConfig,
    state: StateHandle,
    metrics: Option<MetricsRegistry>,
}

impl<D: Decoder> ScanLoop<D> {
    /// Builds a loop over an already-open camera.
    pub fn new(
        camera: SharedCamera,
        decoder: D,
        sink: Box<dyn ResultSink>,
        cancel: CancelToken,
        config: ScanConfig,
    ) -> Self {
        Self {
            camera,
            decoder,
            sink,
            cancel,
            config,
            state: StateHandle::new(),
            metrics: None,
        }
    }

    /// Records activity in `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        metrics.set_state(ScanState::Scanning);
        self.metrics = Some(metrics);
        self
    }

    /// Handle for observing the loop's state from another thread.
    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    /// The token this loop stops on.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn enter(&self, next: ScanState) {
        if self.state.set(next) {
            if let Some(metrics) = &self.metrics {
                metrics.set_state(next);
            }
        }
    }

    /// Runs one capture/decode/deliver cycle without sleeping.
    pub fn step(&mut self) -> Step {
        match self.state.get() {
            ScanState::Terminated => return Step::Cancelled,
            ScanState::Scanning => {}
            _ => self.enter(ScanState::Scanning),
        }

        if !self.camera.is_open() {
            return Step::CameraClosed;
        }

        let frame = match self.camera.capture() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_frame_skipped();
                }
                return Step::NotReady;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Frame capture failed, skipping");
                if let Some(metrics) = &self.metrics {
                    metrics.record_frame_skipped();
                }
                return Step::CaptureFailed;
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_frame_captured();
            metrics.record_decode_attempt();
        }

        let sequence = frame.sequence();
        let Some(text) = self.decoder.decode(&frame) else {
            return Step::NoCode;
        };
        drop(frame);

        if self.cancel.is_cancelled() {
            return Step::Cancelled;
        }

        self.enter(ScanState::Delivering);
        if let Some(metrics) = &self.metrics {
            metrics.record_code_decoded();
        }
        tracing::info!(sequence, "QR code decoded");

        match self.sink.accept(DecodedResult::new(text, sequence)) {
            Ok(AfterDelivery::Resume) => {
                self.enter(ScanState::Cooldown);
                Step::Delivered(AfterDelivery::Resume)
            }
            Ok(AfterDelivery::Stop) => Step::Delivered(AfterDelivery::Stop),
            Err(_) => Step::Cancelled,
        }
    }

    /// Runs until a sink stops the session or the token is cancelled.
    pub fn run(mut self) -> ScanOutcome {
        let poll_interval = self.config.poll_interval();
        let cooldown = self.config.cooldown();
        tracing::info!(
            mode = %self.config.mode,
            poll_ms = self.config.poll_interval_ms,
            "Scan loop started"
        );

        let outcome = loop {
            if self.cancel.sleep(poll_interval) {
                break ScanOutcome::Cancelled;
            }
            match self.step() {
                Step::Delivered(AfterDelivery::Resume) => {
                    if self.cancel.sleep(cooldown) {
                        break ScanOutcome::Cancelled;
                    }
                    self.enter(ScanState::Scanning);
                }
                Step::Delivered(AfterDelivery::Stop) => break ScanOutcome::Delivered,
                Step::Cancelled => break ScanOutcome::Cancelled,
                Step::CameraClosed | Step::NotReady | Step::CaptureFailed | Step::NoCode => {}
            }
        };

        if outcome == ScanOutcome::Cancelled && self.config.release_camera_on_stop {
            self.camera.close();
        }
        self.enter(ScanState::Terminated);
        tracing::info!(outcome = ?outcome, "Scan loop finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureConfig, MockCamera};
    use crate::decode::MockDecoder;
    use crate::scan::handoff::Cancelled;
    use proptest::prelude::*;
    use std::time::{Duration, Instant};

    /// Collects results and answers with a fixed policy.
    struct RecordingSink {
        results: Arc<Mutex<Vec<DecodedResult>>>,
        after: AfterDelivery,
    }

    impl ResultSink for RecordingSink {
        fn accept(&mut self, result: DecodedResult) -> Result<AfterDelivery, Cancelled> {
            self.results.lock().unwrap().push(result);
            Ok(self.after)
        }
    }

    fn open_camera(readiness: Vec<bool>) -> SharedCamera {
        let camera = SharedCamera::new(MockCamera::with_readiness(readiness));
        camera.open(&CaptureConfig::with_dimensions(8, 8)).unwrap();
        camera
    }

    fn fast_config() -> ScanConfig {
        ScanConfig {
            poll_interval_ms: 5,
            cooldown_ms: 200,
            ..Default::default()
        }
    }

    fn build(
        camera: SharedCamera,
        decoder: MockDecoder,
        after: AfterDelivery,
        config: ScanConfig,
    ) -> (ScanLoop<MockDecoder>, Arc<Mutex<Vec<DecodedResult>>>) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            results: Arc::clone(&results),
            after,
        };
        let scan = ScanLoop::new(camera, decoder, Box::new(sink), CancelToken::new(), config);
        (scan, results)
    }

    #[test]
    fn test_closed_camera_is_skipped() {
        let camera = SharedCamera::new(MockCamera::new());
        let decoder = MockDecoder::new().with_code_at(1, "ABC123");
        let (mut scan, results) =
            build(camera, decoder.clone(), AfterDelivery::Stop, fast_config());

        assert_eq!(scan.step(), Step::CameraClosed);
        assert_eq!(decoder.attempts(), 0);
        assert!(results.lock().unwrap().is_empty());
        assert_eq!(scan.state().get(), ScanState::Scanning);
    }

    #[test]
    fn test_not_ready_frame_is_not_decoded() {
        let decoder = MockDecoder::new();
        let (mut scan, _) = build(
            open_camera(vec![false]),
            decoder.clone(),
            AfterDelivery::Stop,
            fast_config(),
        );

        assert_eq!(scan.step(), Step::NotReady);
        assert_eq!(decoder.attempts(), 0);
        assert_eq!(scan.step(), Step::NoCode);
        assert_eq!(decoder.attempts(), 1);
    }

    #[test]
    fn test_resume_enters_cooldown_then_scanning() {
        let decoder = MockDecoder::new().with_code_at(1, "ABC123");
        let (mut scan, results) =
            build(open_camera(vec![]), decoder, AfterDelivery::Resume, fast_config());

        assert_eq!(scan.step(), Step::Delivered(AfterDelivery::Resume));
        assert_eq!(scan.state().get(), ScanState::Cooldown);
        assert_eq!(scan.step(), Step::NoCode);
        assert_eq!(scan.state().get(), ScanState::Scanning);
        assert_eq!(results.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_cancelled_before_delivery_delivers_nothing() {
        let decoder = MockDecoder::new().with_code_at(1, "ABC123");
        let (mut scan, results) =
            build(open_camera(vec![]), decoder, AfterDelivery::Stop, fast_config());

        scan.cancel_token().cancel();

        assert_eq!(scan.step(), Step::Cancelled);
        assert!(results.lock().unwrap().is_empty());
    }

    #[test]
    fn test_run_stops_after_single_shot_delivery() {
        let camera = open_camera(vec![]);
        let decoder = MockDecoder::new().with_code_at(3, "ABC123");
        let (scan, results) = build(
            camera.clone(),
            decoder.clone(),
            AfterDelivery::Stop,
            fast_config(),
        );
        let state = scan.state();

        assert_eq!(scan.run(), ScanOutcome::Delivered);
        assert_eq!(state.get(), ScanState::Terminated);
        assert_eq!(decoder.attempts(), 3);
        assert_eq!(results.lock().unwrap()[0].text(), "ABC123");
        // the consumer owns closing in single-shot handoff
        assert!(camera.is_open());
    }

    #[test]
    fn test_run_honours_cooldown_between_detections() {
        let decoder = MockDecoder::new()
            .with_code_at(1, "first")
            .with_code_at(2, "second");
        let config = fast_config();
        let cooldown = config.cooldown();
        let (scan, results) = build(
            open_camera(vec![]),
            decoder.clone(),
            AfterDelivery::Resume,
            config,
        );
        let cancel = scan.cancel_token().clone();

        let worker = std::thread::spawn(move || scan.run());
        let deadline = Instant::now() + Duration::from_secs(5);
        while results.lock().unwrap().len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        cancel.cancel();
        assert_eq!(worker.join().unwrap(), ScanOutcome::Cancelled);

        let times = decoder.attempt_times();
        assert!(times.len() >= 2);
        assert!(times[1].duration_since(times[0]) >= cooldown);
        let texts: Vec<_> = results
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text().to_owned())
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_cancel_during_poll_wait_is_prompt_and_releases_camera() {
        let camera = open_camera(vec![]);
        let config = ScanConfig {
            poll_interval_ms: 300,
            ..Default::default()
        };
        let (scan, _) = build(camera.clone(), MockDecoder::new(), AfterDelivery::Stop, config);
        let cancel = scan.cancel_token().clone();

        let worker = std::thread::spawn(move || scan.run());
        std::thread::sleep(Duration::from_millis(20));
        let cancelled_at = Instant::now();
        cancel.cancel();

        assert_eq!(worker.join().unwrap(), ScanOutcome::Cancelled);
        assert!(cancelled_at.elapsed() < Duration::from_millis(300));
        assert!(!camera.is_open());
    }

    #[test]
    fn test_camera_kept_open_when_release_disabled() {
        let camera = open_camera(vec![]);
        let config = ScanConfig {
            release_camera_on_stop: false,
            ..fast_config()
        };
        let (scan, _) = build(camera.clone(), MockDecoder::new(), AfterDelivery::Stop, config);
        scan.cancel_token().cancel();

        assert_eq!(scan.run(), ScanOutcome::Cancelled);
        assert!(camera.is_open());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_no_code_never_delivers(readiness in proptest::collection::vec(any::<bool>(), 0..40)) {
            let cycles = readiness.len() + 10;
            let decoder = MockDecoder::new();
            let (mut scan, results) = build(
                open_camera(readiness),
                decoder,
                AfterDelivery::Resume,
                fast_config(),
            );

            for _ in 0..cycles {
                let step = scan.step();
                prop_assert!(matches!(step, Step::NotReady | Step::NoCode));
            }
            prop_assert!(results.lock().unwrap().is_empty());
            prop_assert_eq!(scan.state().get(), ScanState::Scanning);
        }

        #[test]
        fn prop_first_code_delivered_within_k_attempts(
            k in 1u64..30,
            readiness in proptest::collection::vec(any::<bool>(), 0..30),
        ) {
            let decoder = MockDecoder::new().with_code_at(k, "ABC123");
            let (mut scan, results) = build(
                open_camera(readiness),
                decoder.clone(),
                AfterDelivery::Stop,
                fast_config(),
            );

            let mut delivered = false;
            for _ in 0..200 {
                if scan.step() == Step::Delivered(AfterDelivery::Stop) {
                    delivered = true;
                    break;
                }
            }

            prop_assert!(delivered);
            prop_assert!(decoder.attempts() as u64 <= k);
            let results = results.lock().unwrap();
            prop_assert_eq!(results.len(), 1);
            prop_assert_eq!(results[0].text(), "ABC123");
            prop_assert_eq!(results[0].frame_sequence(), k);
        }
    }
}
