//! Decoder abstraction.

use crate::capture::Frame;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Locates and decodes a QR code in a frame.
///
/// Most frames contain no code; `None` is the normal answer and is not
/// an error.
pub trait Decoder {
    /// Attempts to decode one frame.
    fn decode(&mut self, frame: &Frame) -> Option<String>;
}

/// Most recent attempts kept by [`MockDecoder`]; older ones are only counted.
pub const MOCK_ATTEMPT_HISTORY: usize = 1024;

#[derive(Debug, Default)]
struct MockState {
    codes: HashMap<u64, String>,
    attempt_count: usize,
    attempts: VecDeque<(u64, Instant)>,
}

/// Decoder that finds codes in frames chosen by sequence number.
///
/// Clones share state, so a test can keep one clone to inspect the
/// attempts made by a decoder moved into a scan worker.
#[derive(Debug, Clone, Default)]
pub struct MockDecoder {
    state: Arc<Mutex<MockState>>,
}

impl MockDecoder {
    /// A decoder that never finds a code.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame `sequence` will decode to `text`.
    pub fn with_code_at(self, sequence: u64, text: impl Into<String>) -> Self {
        self.lock().codes.insert(sequence, text.into());
        self
    }

    /// Number of decode attempts so far.
    pub fn attempts(&self) -> usize {
        self.lock().attempt_count
    }

    /// Sequence numbers of the most recent frames handed to the decoder,
    /// oldest first. At most [`MOCK_ATTEMPT_HISTORY`] are kept.
    pub fn attempted_sequences(&self) -> Vec<u64> {
        self.lock().attempts.iter().map(|(seq, _)| *seq).collect()
    }

    /// Instants of the most recent decode attempts, oldest first.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.lock().attempts.iter().map(|(_, at)| *at).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Decoder for MockDecoder {
    fn decode(&mut self, frame: &Frame) -> Option<String> {
        let mut state = self.lock();
        state.attempt_count += 1;
        if state.attempts.len() == MOCK_ATTEMPT_HISTORY {
            state.attempts.pop_front();
        }
        state.attempts.push_back((frame.sequence(), Instant::now()));
        state.codes.get(&frame.sequence()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![0; 4], 2, 2, sequence)
    }

    #[test]
    fn test_mock_decoder_hits_configured_frame() {
        let mut decoder = MockDecoder::new().with_code_at(3, "ABC123");

        assert_eq!(decoder.decode(&frame(1)), None);
        assert_eq!(decoder.decode(&frame(3)).as_deref(), Some("ABC123"));
        assert_eq!(decoder.attempted_sequences(), vec![1, 3]);
    }

    #[test]
    fn test_clones_share_attempts() {
        let observer = MockDecoder::new();
        let mut worker_side = observer.clone();

        worker_side.decode(&frame(1));
        worker_side.decode(&frame(2));

        assert_eq!(observer.attempts(), 2);
    }

    #[test]
    fn test_attempt_history_is_bounded() {
        let mut decoder = MockDecoder::new();
        let total = MOCK_ATTEMPT_HISTORY as u64 + 10;

        for sequence in 1..=total {
            decoder.decode(&frame(sequence));
        }

        let sequences = decoder.attempted_sequences();
        assert_eq!(decoder.attempts(), total as usize);
        assert_eq!(sequences.len(), MOCK_ATTEMPT_HISTORY);
        assert_eq!(sequences.first(), Some(&11));
        assert_eq!(sequences.last(), Some(&total));
        assert_eq!(decoder.attempt_times().len(), MOCK_ATTEMPT_HISTORY);
    }
}
