use std::fs;
use std::path::Path;

use crate::storage::domain::file_storage::{FileEntry, FileStorage};

/// [`FileStorage`] on the local filesystem.
pub struct LocalFileStorage;

impl FileStorage for LocalFileStorage {
    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        fs::read(path).map_err(|e| format!("Failed to read {}: {e}", path.display()).into())
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<FileEntry>, Box<dyn std::error::Error>> {
        let read_dir = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for item in read_dir {
            let item = item?;
            let meta = item.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let Some(name) = item.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            entries.push(FileEntry {
                name,
                modified: meta.modified()?,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn delete_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::domain::preview_sweeper::PreviewSweeper;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/file.bin");

        LocalFileStorage.write_file(&path, b"abc").unwrap();

        assert_eq!(LocalFileStorage.read_file(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalFileStorage.read_file(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let listed = LocalFileStorage.list_dir(&dir.path().join("absent")).unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn test_list_skips_subdirectories_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.jpg"), b"1").unwrap();
        fs::write(dir.path().join("a.jpg"), b"2").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let names: Vec<String> = LocalFileStorage
            .list_dir(dir.path())
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();

        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.jpg");
        fs::write(&path, b"x").unwrap();

        LocalFileStorage.delete_file(&path).unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_sweep_against_real_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("face_preview_1.jpg"), b"x").unwrap();
        fs::write(dir.path().join("keep.jpg"), b"x").unwrap();
        let sweeper = PreviewSweeper::new(dir.path(), "face_preview_", Duration::from_secs(3600));

        // Two hours from now, the fresh file counts as expired.
        let later = SystemTime::now() + Duration::from_secs(7200);
        assert_eq!(sweeper.sweep_expired(&LocalFileStorage, later).unwrap(), 1);

        assert!(!dir.path().join("face_preview_1.jpg").exists());
        assert!(dir.path().join("keep.jpg").exists());
    }
}
