/// Shared data structures for the pipeline
///
/// These structs represent the data model that flows between
/// the scheduler, the watcher, the reconciler and the UI layer.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbaImage};

use crate::error::DownloadError;
use crate::imaging::thumbnail::generate_thumbnail;

/// Opaque token identifying a remote image
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the scheduler writes this image under in batch `batch`.
    ///
    /// The batch number keeps a second batch of the same identifiers from
    /// landing on files that already exist. The identifier is escaped rather
    /// than replaced: `[A-Za-z0-9-]` is kept, every other byte becomes `_XX`,
    /// so distinct identifiers always get distinct names and none can escape
    /// the working directory.
    pub fn file_name(&self, batch: u64, extension: &str) -> String {
        let mut stem = String::with_capacity(self.0.len());
        for c in self.0.chars() {
            if c.is_ascii_alphanumeric() || c == '-' {
                stem.push(c);
            } else {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    stem.push_str(&format!("_{byte:02X}"));
                }
            }
        }
        if stem.is_empty() {
            stem.push('_');
        }
        format!("{batch:03}-{stem}.{extension}")
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Result for one identifier of a batch
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub id: ImageId,
    /// Path of the written file on success
    pub result: Result<PathBuf, DownloadError>,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// A new file detected in the watched directory
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalEvent {
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
}

/// A decoded image bound to the file it came from
///
/// Once delivered, the receiver owns it; the pipeline keeps no reference.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub path: PathBuf,
    pub image: DynamicImage,
    /// Grid-sized copy, built together with the decode
    pub thumbnail: RgbaImage,
}

impl DecodedImage {
    /// Bind `image` to `path` and build its thumbnail. This resizes, so
    /// call it from blocking context.
    pub fn new(path: PathBuf, image: DynamicImage) -> Self {
        let thumbnail = generate_thumbnail(&image);
        Self {
            path,
            image,
            thumbnail,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
