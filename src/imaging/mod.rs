/// Image decoding module
///
/// This module handles:
/// - Opening and decoding a just-arrived file (decode.rs)
/// - Shrinking decoded images for the gallery grid (thumbnail.rs)

pub mod decode;
pub mod thumbnail;

pub use decode::{Decoder, ImageDecoder};
