//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and mock implementations for testing.

use super::{CaptureConfig, Frame};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No capture device is present.
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// The device exists but could not be opened.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// The capture configuration was rejected.
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    /// A frame could not be read or converted.
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    /// Capture was requested before `open`.
    #[error("camera not initialized")]
    NotInitialized,
}

/// Trait for camera implementations.
///
/// This abstraction allows swapping between real camera hardware
/// and mock implementations for testing.
pub trait Camera {
    /// Opens and initializes the camera with the given configuration.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Captures a single frame.
    ///
    /// `Ok(None)` means the device has not produced a new frame yet.
    fn capture(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Closes the camera and releases resources.
    ///
    /// Closing a camera that is not open is a no-op.
    fn close(&mut self);
}

/// Mock camera for testing that generates synthetic frames.
///
/// Readiness can be scripted: each entry of the script answers one
/// capture call, `false` meaning "no frame yet". Once the script is
/// exhausted every capture produces a frame.
#[derive(Debug, Default)]
pub struct MockCamera {
    config: Option<CaptureConfig>,
    sequence: u64,
    readiness: VecDeque<bool>,
    disconnected: bool,
    close_count: u64,
}

impl MockCamera {
    /// A mock camera whose frames are always ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// A camera whose frames become available according to `script`.
    pub fn with_readiness(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            readiness: script.into_iter().collect(),
            ..Self::default()
        }
    }

    /// A camera that behaves as if no device is attached.
    pub fn disconnected() -> Self {
        Self {
            disconnected: true,
            ..Self::default()
        }
    }

    /// Number of times an open camera was actually closed.
    pub fn close_count(&self) -> u64 {
        self.close_count
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        if self.disconnected {
            return Err(CameraError::DeviceNotFound("no mock device attached".to_owned()));
        }
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        tracing::info!("MockCamera opened with config: {:?}", config);
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<Frame>, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;

        if !self.readiness.pop_front().unwrap_or(true) {
            return Ok(None);
        }

        // Deterministic gradient shifted by sequence, never a valid symbol
        let pixel_count = config.width as usize * config.height as usize;
        let pixels: Vec<u8> = (0..pixel_count)
            .map(|i| ((i as u64 ^ self.sequence) % 256) as u8)
            .collect();

        self.sequence += 1;
        Ok(Some(Frame::new(
            pixels,
            config.width,
            config.height,
            self.sequence,
        )))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        if self.config.take().is_some() {
            self.close_count += 1;
            tracing::info!("MockCamera closed");
        }
    }
}

/// Shared handle to an open camera.
///
/// The scan worker, the preview and the caller all hold clones. Every
/// operation takes the internal lock, so captures never overlap.
#[derive(Clone)]
pub struct SharedCamera {
    inner: Arc<Mutex<Box<dyn Camera + Send>>>,
}

impl SharedCamera {
    /// Wraps a camera for sharing across threads.
    pub fn new(camera: impl Camera + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(camera))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Camera + Send>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the underlying camera.
    pub fn open(&self, config: &CaptureConfig) -> Result<(), CameraError> {
        self.lock().open(config)
    }

    /// Returns true while the camera is open.
    pub fn is_open(&self) -> bool {
        self.lock().is_open()
    }

    /// Captures one frame, `Ok(None)` if none is ready.
    pub fn capture(&self) -> Result<Option<Frame>, CameraError> {
        self.lock().capture()
    }

    /// Closes the camera. Safe to call any number of times.
    pub fn close(&self) {
        let mut camera = self.lock();
        if camera.is_open() {
            camera.close();
        }
    }
}

impl std::fmt::Debug for SharedCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCamera")
            .field("is_open", &self.is_open())
            .finish()
    }
}
