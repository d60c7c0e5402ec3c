use image::{imageops::FilterType, DynamicImage, RgbaImage};

/// Size of generated thumbnails (square bounding box)
pub const THUMBNAIL_SIZE: u32 = 256;

/// Shrink an image to fit the thumbnail box, keeping its aspect ratio.
/// Images already smaller than the box are only converted, never upscaled.
pub fn generate_thumbnail(image: &DynamicImage) -> RgbaImage {
    if image.width() <= THUMBNAIL_SIZE && image.height() <= THUMBNAIL_SIZE {
        return image.to_rgba8();
    }
    image
        .resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3)
        .to_rgba8()
}
