/// Opening a file as an image.
///
/// A file announced by the watcher may still be mid-write. Most formats make
/// that obvious (the decoder hits EOF), but JPEG decoders will happily render
/// a partial scan, so JPEG data must end with the EOI marker to count as done.

use std::path::Path;

use image::{DynamicImage, ImageFormat};

use crate::error::DecodeError;

/// JPEG Start Of Image (SOI)
const JPEG_START: [u8; 2] = [0xFF, 0xD8];
/// JPEG End Of Image (EOI)
const JPEG_END: [u8; 2] = [0xFF, 0xD9];

/// The opaque "path in, image out" operation the reconciler retries.
pub trait Decoder: Send + Sync + 'static {
    fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError>;
}

/// Default decoder backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl Decoder for ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError> {
        let data = std::fs::read(path)?;
        decode_bytes(&data)
    }
}

/// Decode an in-memory image, rejecting JPEG data that is not finished yet.
pub fn decode_bytes(data: &[u8]) -> Result<DynamicImage, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Truncated);
    }

    let format = image::guess_format(data)?;
    if format == ImageFormat::Jpeg && !is_complete_jpeg(data) {
        return Err(DecodeError::Truncated);
    }

    Ok(image::load_from_memory_with_format(data, format)?)
}

/// Check the SOI/EOI markers. Trailing zero padding after EOI is tolerated.
fn is_complete_jpeg(data: &[u8]) -> bool {
    if !data.starts_with(&JPEG_START) {
        return false;
    }
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    data[..end].ends_with(&JPEG_END)
}
