//! Caller-facing scanner.
//!
//! [`QrScanner`] opens the camera, attaches a preview, and starts the scan
//! worker. In handoff mode [`QrScanner::read_code`] blocks until a code is
//! found; in the other modes the caller just lets it run.

use crate::capture::{Camera, CaptureConfig, ScanConfig, SharedCamera};
use crate::decode::{DecodedResult, Decoder};
use crate::metrics::MetricsRegistry;
use crate::preview::{HeadlessPreview, PreviewWindow};
use crate::scan::{
    CancelToken, ConsoleSink, DeliveryMode, ExitSink, HandoffSink, HandoffSlot, ResultSink,
    ScanError, ScanLoop, ScanOutcome, ScanSession, ScanState,
};
use std::io::Write;
use std::sync::Arc;

/// Configures and starts a [`QrScanner`].
pub struct ScannerBuilder<C, D> {
    camera: C,
    decoder: D,
    capture: CaptureConfig,
    scan: ScanConfig,
    cancel: CancelToken,
    preview: Box<dyn PreviewWindow>,
    metrics: Option<MetricsRegistry>,
    output: Option<Box<dyn Write + Send>>,
    exit_hook: Option<Box<dyn FnMut(i32) + Send>>,
}

impl<C, D> ScannerBuilder<C, D>
where
    C: Camera + Send + 'static,
    D: Decoder + Send + 'static,
{
    fn new(camera: C, decoder: D) -> Self {
        Self {
            camera,
            decoder,
            capture: CaptureConfig::default(),
            scan: ScanConfig::default(),
            cancel: CancelToken::new(),
            preview: Box::new(HeadlessPreview::new()),
            metrics: None,
            output: None,
            exit_hook: None,
        }
    }

    /// Sets the camera format requested at open.
    pub fn capture_config(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    /// Replaces the whole scan configuration.
    pub fn scan_config(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }

    /// Shorthand for setting only the delivery mode.
    pub fn mode(mut self, mode: DeliveryMode) -> Self {
        self.scan.mode = mode;
        self
    }

    /// Stops the session when `cancel` is cancelled.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces the headless preview.
    pub fn preview(mut self, preview: Box<dyn PreviewWindow>) -> Self {
        self.preview = preview;
        self
    }

    /// Records activity in `metrics`.
    pub fn metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Where print-based modes write; stdout by default.
    pub fn output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = Some(output);
        self
    }

    /// Replaces the process exit used by exit-on-success mode.
    pub fn exit_hook(mut self, exit: Box<dyn FnMut(i32) + Send>) -> Self {
        self.exit_hook = Some(exit);
        self
    }

    /// Opens the camera and starts scanning in the background.
    ///
    /// Fails immediately if the camera cannot be opened. A preview that
    /// fails to show is logged and ignored.
    pub fn start(self) -> Result<QrScanner, ScanError> {
        let Self {
            camera,
            decoder,
            capture,
            scan,
            cancel,
            mut preview,
            metrics,
            output,
            exit_hook,
        } = self;

        capture.validate()?;
        scan.validate()?;

        let camera = SharedCamera::new(camera);
        camera.open(&capture)?;

        let mut shown = false;
        if scan.preview {
            match preview.show(&camera, &scan.preview_title) {
                Ok(()) => shown = true,
                Err(e) => tracing::warn!(error = %e, "Preview unavailable, scanning without it"),
            }
        }

        let mode = scan.mode;
        let label = scan.label.clone();
        let console = move || match output {
            Some(out) => ConsoleSink::with_writer(label, out),
            None => ConsoleSink::new(label),
        };
        let slot = (mode == DeliveryMode::Handoff).then(|| Arc::new(HandoffSlot::new()));
        let sink: Box<dyn ResultSink> = match (&slot, mode) {
            (Some(slot), _) => {
                Box::new(HandoffSink::new(Arc::clone(slot)).cancelled_by(cancel.clone()))
            }
            (None, DeliveryMode::ExitOnSuccess) => match exit_hook {
                Some(exit) => Box::new(ExitSink::with_exit_hook(console(), camera.clone(), exit)),
                None => Box::new(ExitSink::new(console(), camera.clone())),
            },
            (None, _) => Box::new(console()),
        };

        let mut scan_loop = ScanLoop::new(camera.clone(), decoder, sink, cancel, scan);
        if let Some(metrics) = &metrics {
            metrics.record_session_started();
            scan_loop = scan_loop.with_metrics(metrics.clone());
        }

        let session = match ScanSession::spawn(scan_loop, slot.clone()) {
            Ok(session) => session,
            Err(e) => {
                camera.close();
                return Err(e);
            }
        };
        tracing::info!(mode = %mode, "Scanner started");

        Ok(QrScanner {
            camera,
            session: Some(session),
            slot,
            preview: shown.then_some(preview),
            mode,
        })
    }
}

/// A running scanner.
///
/// Dropping the scanner cancels its session. Call [`detach`](Self::detach)
/// to leave a continuous session running for the life of the process.
pub struct QrScanner {
    camera: SharedCamera,
    session: Option<ScanSession>,
    slot: Option<Arc<HandoffSlot<DecodedResult>>>,
    preview: Option<Box<dyn PreviewWindow>>,
    mode: DeliveryMode,
}

impl QrScanner {
    /// Starts configuring a scanner over `camera` and `decoder`.
    pub fn builder<C, D>(camera: C, decoder: D) -> ScannerBuilder<C, D>
    where
        C: Camera + Send + 'static,
        D: Decoder + Send + 'static,
    {
        ScannerBuilder::new(camera, decoder)
    }

    /// Blocks until a code is read, then releases the camera.
    ///
    /// Only available in [`DeliveryMode::Handoff`]. Returns
    /// [`ScanError::Cancelled`] if the session is cancelled first, or if a
    /// code was already read from this scanner.
    pub fn read_code(&mut self) -> Result<DecodedResult, ScanError> {
        let slot = self
            .slot
            .as_ref()
            .ok_or(ScanError::NotHandoffMode(self.mode))?;
        let result = slot.take()?;

        self.camera.close();
        self.dispose_preview();
        Ok(result)
    }

    /// Asks the worker to stop.
    pub fn cancel(&self) {
        if let Some(session) = &self.session {
            session.cancel();
        }
    }

    /// Waits for the worker to finish.
    pub fn wait(mut self) -> Result<ScanOutcome, ScanError> {
        match self.session.take() {
            Some(session) => session.join(),
            None => Ok(ScanOutcome::Cancelled),
        }
    }

    /// Leaves the worker running on its own.
    pub fn detach(mut self) {
        self.session.take();
    }

    /// The camera handle shared with the worker.
    pub fn camera(&self) -> &SharedCamera {
        &self.camera
    }

    /// The configured delivery mode.
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Current state of the scan loop.
    pub fn state(&self) -> ScanState {
        self.session
            .as_ref()
            .map_or(ScanState::Terminated, ScanSession::state)
    }

    /// Returns true while a preview window is attached.
    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    fn dispose_preview(&mut self) {
        if let Some(mut preview) = self.preview.take() {
            preview.dispose();
        }
    }
}

impl Drop for QrScanner {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
        self.dispose_preview();
    }
}

impl std::fmt::Debug for QrScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrScanner")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("camera", &self.camera)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CameraError, Frame, MockCamera};
    use crate::decode::{MockDecoder, RqrrDecoder};
    use crate::preview::PreviewError;
    use crate::scan::testing::SharedBuffer;
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    fn fast_scan(mode: DeliveryMode) -> ScanConfig {
        ScanConfig {
            poll_interval_ms: 5,
            cooldown_ms: 50,
            ..ScanConfig::with_mode(mode)
        }
    }

    struct BrokenPreview;

    impl PreviewWindow for BrokenPreview {
        fn show(&mut self, _: &SharedCamera, _: &str) -> Result<(), PreviewError> {
            Err(PreviewError::NoDisplay("test".to_owned()))
        }

        fn is_visible(&self) -> bool {
            false
        }

        fn dispose(&mut self) {}
    }

    #[test]
    fn test_missing_camera_fails_at_start() {
        let result = QrScanner::builder(MockCamera::disconnected(), MockDecoder::new())
            .scan_config(fast_scan(DeliveryMode::Handoff))
            .start();

        assert!(matches!(
            result,
            Err(ScanError::Camera(crate::capture::CameraError::DeviceNotFound(_)))
        ));
    }

    #[test]
    fn test_invalid_config_fails_at_start() {
        let result = QrScanner::builder(MockCamera::new(), MockDecoder::new())
            .capture_config(CaptureConfig::with_dimensions(0, 480))
            .start();

        assert!(matches!(result, Err(ScanError::Config(_))));
    }

    #[test]
    fn test_read_code_returns_result_and_closes_camera() {
        let decoder = MockDecoder::new().with_code_at(4, "ABC123");
        let mut scanner = QrScanner::builder(MockCamera::new(), decoder.clone())
            .scan_config(fast_scan(DeliveryMode::Handoff))
            .start()
            .unwrap();
        assert!(scanner.has_preview());

        let result = scanner.read_code().unwrap();

        assert_eq!(result.text(), "ABC123");
        assert_eq!(result.frame_sequence(), 4);
        assert!(!scanner.camera().is_open());
        assert!(!scanner.has_preview());
        assert_eq!(decoder.attempts(), 4);

        assert!(matches!(scanner.read_code(), Err(ScanError::Cancelled(_))));
        assert_eq!(scanner.wait().unwrap(), ScanOutcome::Delivered);
    }

    #[test]
    fn test_broken_preview_does_not_stop_scanning() {
        let mut scanner = QrScanner::builder(
            MockCamera::new(),
            MockDecoder::new().with_code_at(1, "still works"),
        )
        .scan_config(fast_scan(DeliveryMode::Handoff))
        .preview(Box::new(BrokenPreview))
        .start()
        .unwrap();

        assert!(!scanner.has_preview());
        assert_eq!(scanner.read_code().unwrap().text(), "still works");
    }

    #[test]
    fn test_cancel_unblocks_read_code() {
        let cancel = CancelToken::new();
        let mut scanner = QrScanner::builder(MockCamera::new(), MockDecoder::new())
            .scan_config(fast_scan(DeliveryMode::Handoff))
            .cancel_token(cancel.clone())
            .start()
            .unwrap();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            cancel.cancel();
        });

        let started = Instant::now();
        assert!(matches!(scanner.read_code(), Err(ScanError::Cancelled(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();

        assert_eq!(scanner.wait().unwrap(), ScanOutcome::Cancelled);
    }

    #[test]
    fn test_worker_panic_unblocks_read_code() {
        struct FailingDecoder;

        impl Decoder for FailingDecoder {
            fn decode(&mut self, _: &Frame) -> Option<String> {
                panic!("decoder failure");
            }
        }

        let mut scanner = QrScanner::builder(MockCamera::new(), FailingDecoder)
            .scan_config(fast_scan(DeliveryMode::Handoff))
            .start()
            .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let reader = thread::spawn(move || {
            let read = scanner.read_code();
            tx.send(matches!(read, Err(ScanError::Cancelled(_)))).unwrap();
            scanner
        });

        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        let scanner = reader.join().unwrap();
        assert!(matches!(scanner.wait(), Err(ScanError::WorkerPanicked)));
    }

    #[test]
    fn test_reads_real_symbol_from_camera() {
        struct StillCamera {
            open: bool,
            sequence: u64,
        }

        impl Camera for StillCamera {
            fn open(&mut self, _: &CaptureConfig) -> Result<(), CameraError> {
                self.open = true;
                Ok(())
            }

            fn capture(&mut self) -> Result<Option<Frame>, CameraError> {
                self.sequence += 1;
                Ok(Some(crate::decode::testing::render_symbol(
                    "ABC123",
                    6,
                    self.sequence,
                )))
            }

            fn is_open(&self) -> bool {
                self.open
            }

            fn close(&mut self) {
                self.open = false;
            }
        }

        let camera = StillCamera {
            open: false,
            sequence: 0,
        };
        let mut scanner = QrScanner::builder(camera, RqrrDecoder::new())
            .scan_config(fast_scan(DeliveryMode::Handoff))
            .start()
            .unwrap();

        let result = scanner.read_code().unwrap();

        assert_eq!(result.text(), "ABC123");
        assert_eq!(result.frame_sequence(), 1);
        assert!(!scanner.camera().is_open());
    }

    #[test]
    fn test_read_code_requires_handoff_mode() {
        let mut scanner = QrScanner::builder(MockCamera::new(), MockDecoder::new())
            .scan_config(fast_scan(DeliveryMode::Continuous))
            .output(Box::new(SharedBuffer::default()))
            .start()
            .unwrap();

        assert!(matches!(
            scanner.read_code(),
            Err(ScanError::NotHandoffMode(DeliveryMode::Continuous))
        ));
    }

    #[test]
    fn test_continuous_prints_every_detection() {
        let out = SharedBuffer::default();
        let metrics = MetricsRegistry::new().unwrap();
        let decoder = MockDecoder::new()
            .with_code_at(2, "one")
            .with_code_at(3, "two");
        let scanner = QrScanner::builder(MockCamera::new(), decoder)
            .scan_config(ScanConfig {
                label: "Found".to_owned(),
                ..fast_scan(DeliveryMode::Continuous)
            })
            .output(Box::new(out.clone()))
            .metrics(metrics.clone())
            .start()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while metrics.snapshot().codes_decoded < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        scanner.cancel();
        let camera = scanner.camera().clone();

        assert_eq!(scanner.wait().unwrap(), ScanOutcome::Cancelled);
        assert_eq!(out.contents(), "Found: one\nFound: two\n");
        assert!(!camera.is_open());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions_started, 1);
        assert_eq!(snapshot.codes_decoded, 2);
        assert_eq!(snapshot.scan_state, ScanState::Terminated.code());
    }

    #[test]
    fn test_exit_on_success_exits_with_zero() {
        let out = SharedBuffer::default();
        let codes = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&codes);
        let scanner = QrScanner::builder(MockCamera::new(), MockDecoder::new().with_code_at(1, "done"))
            .scan_config(fast_scan(DeliveryMode::ExitOnSuccess))
            .output(Box::new(out.clone()))
            .exit_hook(Box::new(move |code| recorded.lock().unwrap().push(code)))
            .start()
            .unwrap();
        let camera = scanner.camera().clone();

        assert_eq!(scanner.wait().unwrap(), ScanOutcome::Delivered);
        assert_eq!(out.contents(), "QR code detected: done\n");
        assert_eq!(*codes.lock().unwrap(), vec![0]);
        assert!(!camera.is_open());
    }

    #[test]
    fn test_drop_cancels_session() {
        let scanner = QrScanner::builder(MockCamera::new(), MockDecoder::new())
            .scan_config(fast_scan(DeliveryMode::Handoff))
            .start()
            .unwrap();
        let camera = scanner.camera().clone();

        drop(scanner);

        let deadline = Instant::now() + Duration::from_secs(5);
        while camera.is_open() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!camera.is_open());
    }
}
