//! Background worker running one scan loop.

use super::cancel::CancelToken;
use super::handoff::{Cancelled, HandoffSlot};
use super::scan_loop::{ScanLoop, ScanOutcome, ScanState, StateHandle};
use super::sink::DeliveryMode;
use crate::capture::{CameraError, ConfigError};
use crate::decode::{DecodedResult, Decoder};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Name given to every scan worker thread.
pub const WORKER_THREAD_NAME: &str = "qr-code-scanner-thread";

/// Errors surfaced by scan sessions and the scanner facade.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The camera could not be opened.
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The session was cancelled while the caller was waiting.
    #[error("scan cancelled")]
    Cancelled(#[from] Cancelled),
    /// `read_code` was called on a scanner that does not hand off results.
    #[error("scanner is in {0} mode, results are not handed off")]
    NotHandoffMode(DeliveryMode),
    /// The worker thread could not be started.
    #[error("failed to spawn scan worker: {0}")]
    Spawn(#[from] std::io::Error),
    /// The worker thread panicked.
    #[error("scan worker panicked")]
    WorkerPanicked,
}

/// Closes the handoff slot when the worker exits, including by unwinding.
struct CloseOnExit(Option<Arc<HandoffSlot<DecodedResult>>>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        if let Some(slot) = self.0.take() {
            if thread::panicking() {
                tracing::error!("Scan worker panicked, releasing waiting reader");
            }
            slot.close();
        }
    }
}

/// A scan loop running on its own thread.
///
/// The worker is detached: it never keeps the process alive, and dropping
/// the session leaves it running. Use [`cancel`](Self::cancel) to stop it.
pub struct ScanSession {
    handle: Option<JoinHandle<ScanOutcome>>,
    cancel: CancelToken,
    state: StateHandle,
}

impl ScanSession {
    /// Starts `scan_loop` on a new named thread.
    ///
    /// When `slot` is given it is closed as soon as the session is
    /// cancelled or the worker finishes, so a waiting consumer is never
    /// left hanging.
    pub fn spawn<D>(
        scan_loop: ScanLoop<D>,
        slot: Option<Arc<HandoffSlot<DecodedResult>>>,
    ) -> Result<Self, ScanError>
    where
        D: Decoder + Send + 'static,
    {
        let cancel = scan_loop.cancel_token().clone();
        let state = scan_loop.state();

        if let Some(slot) = &slot {
            let slot = Arc::clone(slot);
            cancel.on_cancel(move || slot.close());
        }

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || {
                let _release = CloseOnExit(slot);
                scan_loop.run()
            })?;

        Ok(Self {
            handle: Some(handle),
            cancel,
            state,
        })
    }

    /// Asks the worker to stop. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The session's cancellation token.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Current state of the loop.
    pub fn state(&self) -> ScanState {
        self.state.get()
    }

    /// Returns true once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the worker to exit.
    pub fn join(mut self) -> Result<ScanOutcome, ScanError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ScanError::WorkerPanicked),
            None => Ok(ScanOutcome::Cancelled),
        }
    }
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("state", &self.state())
            .field("finished", &self.is_finished())
            .finish()
    }
}
