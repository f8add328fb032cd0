//! The value produced by a successful decode.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Text decoded from a QR code, with where and when it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedResult {
    text: String,
    frame_sequence: u64,
    decoded_at: DateTime<Utc>,
}

impl DecodedResult {
    /// Creates a result for text decoded from frame `frame_sequence`.
    pub fn new(text: impl Into<String>, frame_sequence: u64) -> Self {
        Self {
            text: text.into(),
            frame_sequence,
            decoded_at: Utc::now(),
        }
    }

    /// The decoded text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Sequence number of the frame the code was found in.
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    /// Wall-clock time of the decode.
    pub fn decoded_at(&self) -> DateTime<Utc> {
        self.decoded_at
    }

    /// Consumes the result, returning the text.
    pub fn into_text(self) -> String {
        self.text
    }
}

impl std::fmt::Display for DecodedResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
