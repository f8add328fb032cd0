//! Result delivery policies.
//!
//! A scan session hands each decoded result to exactly one [`ResultSink`].
//! The sink's answer decides whether the session cools down and keeps
//! scanning or stops for good.

use super::cancel::CancelToken;
use super::handoff::{Cancelled, HandoffSlot};
use crate::capture::SharedCamera;
use crate::decode::DecodedResult;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;

/// How decoded results leave the scanner.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    /// Print every detection and keep scanning after a cooldown.
    #[default]
    Continuous,
    /// Print the first detection, release the camera and exit the process.
    ExitOnSuccess,
    /// Hand the first detection to a caller blocked in `read_code`.
    Handoff,
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeliveryMode::Continuous => "continuous",
            DeliveryMode::ExitOnSuccess => "exit-on-success",
            DeliveryMode::Handoff => "handoff",
        };
        f.write_str(name)
    }
}

/// What the session does after a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterDelivery {
    /// Cool down, then scan again.
    Resume,
    /// Terminate the session.
    Stop,
}

/// Accepts decoded results.
pub trait ResultSink: Send {
    /// Delivers one result.
    ///
    /// May block (handoff back-pressure); returns [`Cancelled`] if the
    /// session ended while waiting.
    fn accept(&mut self, result: DecodedResult) -> Result<AfterDelivery, Cancelled>;
}

/// Writes `<label>: <text>` lines and keeps scanning.
pub struct ConsoleSink {
    label: String,
    out: Box<dyn Write + Send>,
}

impl ConsoleSink {
    /// A sink printing to stdout.
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_writer(label, Box::new(std::io::stdout()))
    }

    /// A sink printing to an arbitrary writer.
    pub fn with_writer(label: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            label: label.into(),
            out,
        }
    }

    fn print(&mut self, result: &DecodedResult) {
        let written = writeln!(self.out, "{}: {}", self.label, result.text())
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            tracing::warn!(error = %e, "Failed to write decoded result");
        }
    }
}

impl ResultSink for ConsoleSink {
    fn accept(&mut self, result: DecodedResult) -> Result<AfterDelivery, Cancelled> {
        self.print(&result);
        Ok(AfterDelivery::Resume)
    }
}

fn exit_process(code: i32) {
    std::process::exit(code)
}

/// Prints the first result, closes the camera and exits with status 0.
pub struct ExitSink {
    console: ConsoleSink,
    camera: SharedCamera,
    exit: Box<dyn FnMut(i32) + Send>,
}

impl ExitSink {
    /// Exits the process through `std::process::exit`.
    pub fn new(console: ConsoleSink, camera: SharedCamera) -> Self {
        Self::with_exit_hook(console, camera, Box::new(exit_process))
    }

    /// Replaces `std::process::exit` with `exit`.
    pub fn with_exit_hook(
        console: ConsoleSink,
        camera: SharedCamera,
        exit: Box<dyn FnMut(i32) + Send>,
    ) -> Self {
        Self {
            console,
            camera,
            exit,
        }
    }
}

impl ResultSink for ExitSink {
    fn accept(&mut self, result: DecodedResult) -> Result<AfterDelivery, Cancelled> {
        self.console.print(&result);
        self.camera.close();
        tracing::info!("Code delivered, exiting");
        (self.exit)(0);
        Ok(AfterDelivery::Stop)
    }
}

/// Places the first result in a handoff slot for a blocked caller.
///
/// The camera stays open; the consumer closes it after taking the value.
pub struct HandoffSink {
    slot: Arc<HandoffSlot<DecodedResult>>,
    cancel: Option<CancelToken>,
}

impl HandoffSink {
    /// A sink filling `slot`.
    pub fn new(slot: Arc<HandoffSlot<DecodedResult>>) -> Self {
        Self { slot, cancel: None }
    }

    /// Refuses delivery once `cancel` is cancelled, even if the slot is
    /// still open.
    pub fn cancelled_by(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl ResultSink for HandoffSink {
    fn accept(&mut self, result: DecodedResult) -> Result<AfterDelivery, Cancelled> {
        match &self.cancel {
            Some(cancel) => self.slot.put_unless(result, || cancel.is_cancelled())?,
            None => self.slot.put(result)?,
        }
        Ok(AfterDelivery::Stop)
    }
}
