//! QR code decoding.
//!
//! The scan loop only sees the [`Decoder`] trait. [`RqrrDecoder`] does the
//! real work; [`MockDecoder`] drives tests and the demo mode.

mod decoder;
mod qr;
mod result;

pub use decoder::{Decoder, MockDecoder, MOCK_ATTEMPT_HISTORY};
pub use qr::RqrrDecoder;
pub use result::DecodedResult;

#[cfg(test)]
pub(crate) use qr::testing;
