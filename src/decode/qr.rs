//! QR decoding with rqrr.

use super::Decoder;
use crate::capture::Frame;

/// Pure Rust QR decoder.
///
/// Binarization, grid detection and error correction are all done by
/// `rqrr`; this type only adapts frames to it. The first grid that
/// decodes wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    /// Creates a decoder.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RqrrDecoder {
    fn decode(&mut self, frame: &Frame) -> Option<String> {
        if !frame.is_valid() {
            tracing::debug!(sequence = frame.sequence(), "Skipping malformed frame");
            return None;
        }

        let width = frame.width() as usize;
        let pixels = frame.pixels();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width,
            frame.height() as usize,
            |x, y| pixels[y * width + x],
        );

        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((meta, content)) => {
                    tracing::trace!(
                        sequence = frame.sequence(),
                        version = meta.version.0,
                        "QR grid decoded"
                    );
                    return Some(content);
                }
                Err(e) => {
                    tracing::trace!(sequence = frame.sequence(), error = ?e, "QR grid rejected");
                }
            }
        }
        None
    }
}


#[cfg(test)]
mod tests {
    use super::testing::render_symbol;
    use super::*;

    #[test]
    fn test_decodes_rendered_symbol() {
        let mut decoder = RqrrDecoder::new();
        let frame = render_symbol("ABC123", 8, 3);
        assert_eq!(decoder.decode(&frame).as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_decodes_symbol_inside_larger_frame() {
        let symbol = render_symbol("https://example.com/item/42", 4, 1);
        let side = symbol.width() as usize;
        let (width, height) = (side + 120, side + 60);

        let mut pixels = vec![200u8; width * height];
        for y in 0..side {
            let row = &symbol.pixels()[y * side..(y + 1) * side];
            let start = (y + 30) * width + 90;
            pixels[start..start + side].copy_from_slice(row);
        }
        let frame = Frame::new(pixels, width as u32, height as u32, 1);

        let mut decoder = RqrrDecoder::new();
        assert_eq!(
            decoder.decode(&frame).as_deref(),
            Some("https://example.com/item/42")
        );
    }

    #[test]
    fn test_wrong_stride_does_not_panic() {
        let symbol = render_symbol("ABC123", 8, 1);
        let side = symbol.width() as usize;
        let narrow = side - 3;
        let pixels = symbol.pixels()[..narrow * side].to_vec();
        let frame = Frame::new(pixels, narrow as u32, side as u32, 1);

        let mut decoder = RqrrDecoder::new();
        let _ = decoder.decode(&frame);
    }

    #[test]
    fn test_blank_frame_has_no_code() {
        let mut decoder = RqrrDecoder::new();
        let frame = Frame::new(vec![255u8; 320 * 240], 320, 240, 1);
        assert_eq!(decoder.decode(&frame), None);
    }

    #[test]
    fn test_noise_frame_has_no_code() {
        let mut decoder = RqrrDecoder::new();
        let pixels = (0..160 * 120).map(|i| ((i * 37) % 256) as u8).collect();
        let frame = Frame::new(pixels, 160, 120, 7);
        assert_eq!(decoder.decode(&frame), None);
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let mut decoder = RqrrDecoder::new();
        let frame = Frame::new(vec![0u8; 10], 640, 480, 1);
        assert_eq!(decoder.decode(&frame), None);
    }
}
