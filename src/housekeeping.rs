/// Startup cleanup of the working directory.
///
/// Stale images from a previous run would be mistaken for fresh arrivals, so
/// they are deleted before the watcher starts.

use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::has_extension;
use crate::error::HousekeepingError;

/// Delete every file directly inside `dir` that carries `extension`.
///
/// Sub-directories and other file types are left alone. Returns the number of
/// files removed.
pub fn clean(dir: &Path, extension: &str) -> Result<usize, HousekeepingError> {
    let mut removed = 0;

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| HousekeepingError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        if !entry.file_type().is_file() || !has_extension(path, extension) {
            continue;
        }

        std::fs::remove_file(path).map_err(|source| HousekeepingError::Delete {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Removed stale image");
        removed += 1;
    }

    info!(dir = %dir.display(), removed, "🧹 Working directory cleaned");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_removes_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("b.JPG"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.jpg"), b"x").unwrap();

        let removed = clean(dir.path(), "jpg").unwrap();

        assert_eq!(removed, 2);
        assert!(!dir.path().join("a.jpg").exists());
        assert!(!dir.path().join("b.JPG").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("nested").join("c.jpg").exists());
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(clean(dir.path(), "jpg").unwrap(), 0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        assert!(matches!(
            clean(&missing, "jpg"),
            Err(HousekeepingError::Scan { .. })
        ));
    }
}
