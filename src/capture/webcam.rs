//! Webcam capture through nokhwa.
//!
//! The nokhwa camera object is not `Send` on every backend, so it lives on
//! a dedicated `camera-capture` thread. [`NokhwaCamera`] is a thin proxy
//! that forwards capture requests over a channel and waits for the reply.

use super::{Camera, CameraError, CaptureConfig, Frame};
use nokhwa::pixel_format::LumaFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};

type CaptureReply = Result<Option<Frame>, CameraError>;

enum Command {
    Capture(SyncSender<CaptureReply>),
    Close,
}

struct Worker {
    commands: Sender<Command>,
    handle: JoinHandle<()>,
}

/// Lists the human-readable names of the attached capture devices.
pub fn list_devices() -> Result<Vec<String>, CameraError> {
    let devices = nokhwa::query(ApiBackend::Auto)
        .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;
    Ok(devices.into_iter().map(|info| info.human_name()).collect())
}

/// A physical webcam.
#[derive(Default)]
pub struct NokhwaCamera {
    worker: Option<Worker>,
}

impl NokhwaCamera {
    /// A camera that opens the configured device on first `open`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a camera after checking that at least one device exists.
    pub fn first_available() -> Result<Self, CameraError> {
        let devices = list_devices()?;
        if devices.is_empty() {
            return Err(CameraError::DeviceNotFound("no cameras detected".to_owned()));
        }
        tracing::debug!(devices = ?devices, "Detected capture devices");
        Ok(Self::new())
    }
}

impl Camera for NokhwaCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.close();

        let (commands, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let thread_config = config.clone();
        let handle = thread::Builder::new()
            .name("camera-capture".to_owned())
            .spawn(move || run_capture(thread_config, command_rx, ready_tx))
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(Worker { commands, handle });
                tracing::info!(
                    device = config.device_id,
                    width = config.width,
                    height = config.height,
                    "Webcam opened"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(CameraError::OpenFailed(
                "capture thread exited during open".to_owned(),
            )),
        }
    }

    fn capture(&mut self) -> Result<Option<Frame>, CameraError> {
        let worker = self.worker.as_ref().ok_or(CameraError::NotInitialized)?;
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        worker
            .commands
            .send(Command::Capture(reply_tx))
            .map_err(|_| CameraError::CaptureFailed("capture thread stopped".to_owned()))?;
        reply_rx
            .recv()
            .map_err(|_| CameraError::CaptureFailed("capture thread stopped".to_owned()))?
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.commands.send(Command::Close);
            if worker.handle.join().is_err() {
                tracing::warn!("Camera capture thread panicked");
            }
            tracing::info!("Webcam closed");
        }
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_capture(
    config: CaptureConfig,
    commands: Receiver<Command>,
    ready: SyncSender<Result<(), CameraError>>,
) {
    let requested = RequestedFormat::new::<LumaFormat>(RequestedFormatType::Closest(
        CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        ),
    ));

    let mut camera = match nokhwa::Camera::new(CameraIndex::Index(config.device_id), requested) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(CameraError::DeviceNotFound(e.to_string())));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(CameraError::OpenFailed(e.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));

    let mut sequence = 0u64;
    while let Ok(command) = commands.recv() {
        match command {
            Command::Capture(reply) => {
                let _ = reply.send(grab(&mut camera, &mut sequence));
            }
            Command::Close => break,
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!(error = %e, "Failed to stop camera stream");
    }
}

fn grab(camera: &mut nokhwa::Camera, sequence: &mut u64) -> CaptureReply {
    let buffer = camera
        .frame()
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
    let image = buffer
        .decode_image::<LumaFormat>()
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

    *sequence += 1;
    let (width, height) = (image.width(), image.height());
    Ok(Some(Frame::new(image.into_raw(), width, height, *sequence)))
}
