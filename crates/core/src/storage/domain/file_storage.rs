use std::path::Path;
use std::time::SystemTime;

/// One directory listing entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub modified: SystemTime,
}

/// Byte-level file access used for frame reads, preview persistence and
/// the expiry sweep.
pub trait FileStorage: Send + Sync {
    /// Writes `bytes`, creating parent directories as needed.
    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>>;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// Regular files directly inside `dir`. A missing directory lists empty.
    fn list_dir(&self, dir: &Path) -> Result<Vec<FileEntry>, Box<dyn std::error::Error>>;

    fn delete_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>>;
}
