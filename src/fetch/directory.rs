/// Local-folder source
///
/// Serves `<root>/<id>.<extension>` after an optional artificial delay, which
/// makes the difference between the scheduling policies visible without a
/// network. The extension matches case-insensitively, both when listing and
/// when fetching.
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use walkdir::WalkDir;

use super::FetchClient;
use crate::config::has_extension;
use crate::error::FetchError;
use crate::state::data::ImageId;

#[derive(Debug, Clone)]
pub struct DirectoryFetchClient {
    root: PathBuf,
    extension: String,
    latency: Duration,
}

impl DirectoryFetchClient {
    pub fn new(root: PathBuf, extension: String, latency: Duration) -> Self {
        Self {
            root,
            extension,
            latency,
        }
    }

    /// Source images as `(identifier, path)`, sorted by file name.
    fn sources(&self) -> Result<Vec<(ImageId, PathBuf)>, FetchError> {
        let mut found = Vec::new();

        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| FetchError::new(e.to_string()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !has_extension(path, &self.extension) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                found.push((ImageId::new(stem), path.to_path_buf()));
            }
        }

        Ok(found)
    }

    /// The file backing `id`: the exact name when it exists, otherwise any
    /// file with that stem whose extension differs only in case.
    fn resolve(&self, id: &ImageId) -> Result<PathBuf, FetchError> {
        let exact = self.root.join(format!("{}.{}", id.as_str(), self.extension));
        if exact.is_file() {
            return Ok(exact);
        }

        self.sources()?
            .into_iter()
            .find(|(stem, _)| stem == id)
            .map(|(_, path)| path)
            .ok_or_else(|| FetchError::new(format!("{}: no such source image", exact.display())))
    }
}

#[async_trait]
impl FetchClient for DirectoryFetchClient {
    async fn fetch(&self, id: &ImageId) -> Result<Vec<u8>, FetchError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let path = self.resolve(id)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::new(format!("{}: {e}", path.display())))
    }

    async fn list_identifiers(&self) -> Result<Vec<ImageId>, FetchError> {
        Ok(self.sources()?.into_iter().map(|(id, _)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_fetch_reads_source_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cat.jpg"), b"meow").unwrap();
        let client = DirectoryFetchClient::new(dir.path().to_path_buf(), "jpg".into(), Duration::ZERO);

        assert_eq!(client.fetch(&ImageId::new("cat")).await.unwrap(), b"meow");
        assert!(client.fetch(&ImageId::new("dog")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_identifiers_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.jpg"), b"x").unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("readme.md"), b"x").unwrap();
        let client = DirectoryFetchClient::new(dir.path().to_path_buf(), "jpg".into(), Duration::ZERO);

        let ids = client.list_identifiers().await.unwrap();
        assert_eq!(ids, vec![ImageId::new("a"), ImageId::new("b")]);
    }

    #[tokio::test]
    async fn test_upper_case_extension_is_listed_and_fetched() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SHOT.PNG"), b"pixels").unwrap();
        let client = DirectoryFetchClient::new(dir.path().to_path_buf(), "png".into(), Duration::ZERO);

        let ids = client.list_identifiers().await.unwrap();
        assert_eq!(ids, vec![ImageId::new("SHOT")]);
        for id in &ids {
            assert_eq!(client.fetch(id).await.unwrap(), b"pixels");
        }
    }
}
