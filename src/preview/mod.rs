//! Live preview of the camera feed.
//!
//! The preview only observes the camera. A preview that fails to start
//! never stops scanning, and disposing it leaves the session untouched.

use crate::capture::SharedCamera;
use thiserror::Error;

/// Errors raised while showing a preview.
#[derive(Debug, Error)]
pub enum PreviewError {
    /// There is no display to draw on.
    #[error("no display available: {0}")]
    NoDisplay(String),
    /// The window could not be created.
    #[error("failed to create preview window: {0}")]
    WindowFailed(String),
}

/// A window mirroring the camera feed.
pub trait PreviewWindow: Send {
    /// Attaches to `camera` and shows the window.
    fn show(&mut self, camera: &SharedCamera, title: &str) -> Result<(), PreviewError>;

    /// Returns true while the window is shown.
    fn is_visible(&self) -> bool;

    /// Hides the window and detaches from the camera.
    fn dispose(&mut self);
}

/// Preview used when no display is available. It only logs.
#[derive(Debug, Default)]
pub struct HeadlessPreview {
    title: Option<String>,
}

impl HeadlessPreview {
    /// A preview that is not yet shown.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreviewWindow for HeadlessPreview {
    fn show(&mut self, _camera: &SharedCamera, title: &str) -> Result<(), PreviewError> {
        tracing::info!(title, "Preview running headless, point the code at the camera");
        self.title = Some(title.to_owned());
        Ok(())
    }

    fn is_visible(&self) -> bool {
        self.title.is_some()
    }

    fn dispose(&mut self) {
        if let Some(title) = self.title.take() {
            tracing::debug!(title = %title, "Preview disposed");
        }
    }
}
