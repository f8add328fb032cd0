//! Camera input and frame handling.
//!
//! This module provides abstractions for capturing frames from a camera
//! and managing scanner configuration. Real hardware sits behind the
//! `camera` feature; everything else runs against [`MockCamera`].

mod camera;
mod config;
mod frame;
#[cfg(feature = "camera")]
mod webcam;

pub use camera::{Camera, CameraError, MockCamera, SharedCamera};
pub use config::{
    CaptureConfig, ConfigError, FileConfig, MetricsConfig, ScanConfig, MAX_DIMENSION,
};
pub use frame::Frame;
#[cfg(feature = "camera")]
pub use webcam::{list_devices, NokhwaCamera};
