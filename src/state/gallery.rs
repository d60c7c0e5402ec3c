use std::path::PathBuf;

use iced::widget::image::Handle;

use super::data::{DecodedImage, DownloadOutcome};
use crate::error::DownloadError;

/// One delivered image, ready to render
#[derive(Debug, Clone)]
pub struct GalleryItem {
    pub path: PathBuf,
    /// Size of the full decoded image
    pub width: u32,
    pub height: u32,
    pub thumbnail: Handle,
}

/// Running count of outcomes for the current batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchTally {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

/// The consumer's view: an append-only list of delivered images.
///
/// It is only ever mutated from the UI's update loop, so deliveries land one
/// at a time in the order they were handed off.
#[derive(Debug, Default)]
pub struct Gallery {
    items: Vec<GalleryItem>,
    failures: Vec<String>,
    tally: BatchTally,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything shown so far, ahead of a new batch.
    pub fn clear(&mut self) {
        self.items.clear();
        self.failures.clear();
        self.tally = BatchTally::default();
    }

    /// Take ownership of a decoded image and append its thumbnail.
    /// No image processing happens here; the thumbnail arrives prebuilt.
    pub fn push(&mut self, decoded: DecodedImage) {
        let (width, height) = (decoded.width(), decoded.height());
        let (thumb_width, thumb_height) = decoded.thumbnail.dimensions();

        self.items.push(GalleryItem {
            path: decoded.path,
            width,
            height,
            thumbnail: Handle::from_rgba(thumb_width, thumb_height, decoded.thumbnail.into_raw()),
        });
    }

    pub fn record_outcome(&mut self, outcome: &DownloadOutcome) {
        match &outcome.result {
            Ok(_) => self.tally.succeeded += 1,
            Err(DownloadError::Cancelled) => self.tally.cancelled += 1,
            Err(e) => {
                self.tally.failed += 1;
                self.failures.push(e.to_string());
            }
        }
    }

    pub fn record_failure(&mut self, message: String) {
        self.failures.push(message);
    }

    pub fn items(&self) -> &[GalleryItem] {
        &self.items
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn tally(&self) -> BatchTally {
        self.tally
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::ImageId;
    use image::DynamicImage;

    fn decoded(name: &str, width: u32, height: u32) -> DecodedImage {
        DecodedImage::new(PathBuf::from(name), DynamicImage::new_rgb8(width, height))
    }

    #[test]
    fn test_push_appends_in_order() {
        let mut gallery = Gallery::new();
        gallery.push(decoded("a.jpg", 800, 600));
        gallery.push(decoded("b.jpg", 10, 10));

        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.items()[0].path, PathBuf::from("a.jpg"));
        assert_eq!((gallery.items()[0].width, gallery.items()[0].height), (800, 600));
        assert_eq!(gallery.items()[1].path, PathBuf::from("b.jpg"));
    }

    #[test]
    fn test_tally_and_clear() {
        let mut gallery = Gallery::new();
        gallery.push(decoded("a.jpg", 4, 4));
        gallery.record_outcome(&DownloadOutcome {
            id: ImageId::new("a"),
            result: Ok(PathBuf::from("a.jpg")),
        });
        gallery.record_outcome(&DownloadOutcome {
            id: ImageId::new("b"),
            result: Err(DownloadError::Fetch {
                id: ImageId::new("b"),
                reason: "404".into(),
            }),
        });
        gallery.record_outcome(&DownloadOutcome {
            id: ImageId::new("c"),
            result: Err(DownloadError::Cancelled),
        });

        assert_eq!(
            gallery.tally(),
            BatchTally {
                succeeded: 1,
                failed: 1,
                cancelled: 1
            }
        );
        assert_eq!(gallery.tally().total(), 3);
        assert_eq!(gallery.failures().len(), 1);

        gallery.clear();
        assert!(gallery.is_empty());
        assert!(gallery.failures().is_empty());
        assert_eq!(gallery.tally(), BatchTally::default());
    }
}
