//! Webcam QR Code Scanner Library
//!
//! Polls a camera, runs each frame through a QR decoder and delivers the
//! first (or every) decoded text to the caller.
//!
//! # Architecture
//!
//! ```text
//! camera ──▶ scan loop (background thread) ──▶ result sink
//!   │          poll 100ms → capture → decode        ├─ print, keep scanning
//!   └──▶ preview (observational)                    ├─ print, exit process
//!                                                   └─ handoff to read_code()
//! ```
//!
//! # Design Principles
//!
//! - **One worker per session**: capture and decode never overlap
//! - **Misses are normal**: no frame or no code is not an error
//! - **Cancellable**: cancelling wakes the worker and any blocked reader
//! - **Camera close is idempotent**: every holder may close it safely
//!
//! # Example
//!
//! ```no_run
//! use qr_scanner::{
//!     capture::MockCamera,
//!     decode::RqrrDecoder,
//!     scan::DeliveryMode,
//!     QrScanner,
//! };
//!
//! let mut scanner = QrScanner::builder(MockCamera::new(), RqrrDecoder::new())
//!     .mode(DeliveryMode::Handoff)
//!     .start()
//!     .unwrap();
//!
//! let code = scanner.read_code().unwrap();
//! println!("QR code data: {}", code.text());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod decode;
pub mod metrics;
pub mod preview;
pub mod reader;
pub mod scan;

// Re-export commonly used types at crate root
pub use capture::{Camera, CaptureConfig, FileConfig, Frame, MockCamera, ScanConfig, SharedCamera};
pub use decode::{DecodedResult, Decoder, MockDecoder, RqrrDecoder};
pub use preview::{HeadlessPreview, PreviewWindow};
pub use reader::{QrScanner, ScannerBuilder};
pub use scan::{CancelToken, DeliveryMode, ScanError, ScanOutcome, ScanState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
