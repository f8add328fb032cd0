//! Scanning: the poll loop, its worker thread and result delivery.
//!
//! One [`ScanSession`] runs one [`ScanLoop`] on a background thread. The
//! loop reports through a [`ResultSink`] chosen by [`DeliveryMode`]:
//! print and continue, print and exit, or hand off through a
//! capacity-1 [`HandoffSlot`].

mod cancel;
mod handoff;
mod scan_loop;
mod session;
mod sink;

pub use cancel::CancelToken;
pub use handoff::{Cancelled, HandoffSlot};
pub use scan_loop::{ScanLoop, ScanOutcome, ScanState, StateHandle, Step};
pub use session::{ScanError, ScanSession, WORKER_THREAD_NAME};
pub use sink::{AfterDelivery, ConsoleSink, DeliveryMode, ExitSink, HandoffSink, ResultSink};

#[cfg(test)]
pub(crate) use sink::testing;
