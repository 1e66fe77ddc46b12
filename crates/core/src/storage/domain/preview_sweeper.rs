use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::file_storage::FileStorage;

/// Deletes preview files older than a retention window.
///
/// Works purely on file name prefix and modification time, independent of
/// the in-memory history, so files orphaned by eviction or a restart are
/// collected too.
pub struct PreviewSweeper {
    dir: PathBuf,
    prefix: String,
    max_age: Duration,
}

impl PreviewSweeper {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            max_age,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the number of files deleted. Individual delete failures are
    /// logged and skipped.
    pub fn sweep_expired(
        &self,
        storage: &dyn FileStorage,
        now: SystemTime,
    ) -> Result<usize, Box<dyn std::error::Error>> {
        let mut deleted = 0;
        for entry in storage.list_dir(&self.dir)? {
            if !entry.name.starts_with(&self.prefix) {
                continue;
            }
            // Files stamped in the future are younger than anything, keep them.
            let age = now.duration_since(entry.modified).unwrap_or(Duration::ZERO);
            if age <= self.max_age {
                continue;
            }
            let path = self.dir.join(&entry.name);
            match storage.delete_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => log::warn!("Failed to delete expired preview {}: {e}", path.display()),
            }
        }
        if deleted > 0 {
            log::info!("Swept {deleted} expired previews from {}", self.dir.display());
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::domain::file_storage::FileEntry;
    use std::sync::Mutex;

    const HOUR: Duration = Duration::from_secs(3600);

    struct StubStorage {
        entries: Vec<FileEntry>,
        deleted: Mutex<Vec<PathBuf>>,
        fail_on: Option<String>,
    }

    impl StubStorage {
        fn new(entries: Vec<FileEntry>) -> Self {
            Self {
                entries,
                deleted: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }
    }

    impl FileStorage for StubStorage {
        fn write_file(&self, _: &Path, _: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }

        fn read_file(&self, _: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
            Ok(Vec::new())
        }

        fn list_dir(&self, _: &Path) -> Result<Vec<FileEntry>, Box<dyn std::error::Error>> {
            Ok(self.entries.clone())
        }

        fn delete_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
            if let Some(ref name) = self.fail_on {
                if path.ends_with(name) {
                    return Err("permission denied".into());
                }
            }
            self.deleted.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn entry(name: &str, now: SystemTime, age: Duration) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            modified: now - age,
        }
    }

    #[test]
    fn test_deletes_two_hour_old_file_keeps_ten_minute_old() {
        let now = SystemTime::now();
        let storage = StubStorage::new(vec![
            entry("face_preview_old.jpg", now, 2 * HOUR),
            entry("face_preview_new.jpg", now, Duration::from_secs(600)),
        ]);
        let sweeper = PreviewSweeper::new("/cache/previews", "face_preview_", HOUR);

        let deleted = sweeper.sweep_expired(&storage, now).unwrap();

        assert_eq!(deleted, 1);
        let paths = storage.deleted.lock().unwrap();
        assert_eq!(paths.as_slice(), &[PathBuf::from("/cache/previews/face_preview_old.jpg")]);
    }

    #[test]
    fn test_ignores_files_without_prefix() {
        let now = SystemTime::now();
        let storage = StubStorage::new(vec![entry("capture_0001.jpg", now, 5 * HOUR)]);
        let sweeper = PreviewSweeper::new("/cache", "face_preview_", HOUR);

        assert_eq!(sweeper.sweep_expired(&storage, now).unwrap(), 0);
        assert!(storage.deleted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_future_mtime_is_kept() {
        let now = SystemTime::now();
        let storage = StubStorage::new(vec![FileEntry {
            name: "face_preview_skewed.jpg".into(),
            modified: now + HOUR,
        }]);
        let sweeper = PreviewSweeper::new("/cache", "face_preview_", HOUR);

        assert_eq!(sweeper.sweep_expired(&storage, now).unwrap(), 0);
    }

    #[test]
    fn test_delete_failure_does_not_stop_sweep() {
        let now = SystemTime::now();
        let mut storage = StubStorage::new(vec![
            entry("face_preview_a.jpg", now, 3 * HOUR),
            entry("face_preview_b.jpg", now, 3 * HOUR),
        ]);
        storage.fail_on = Some("face_preview_a.jpg".into());
        let sweeper = PreviewSweeper::new("/cache", "face_preview_", HOUR);

        assert_eq!(sweeper.sweep_expired(&storage, now).unwrap(), 1);
    }
}
