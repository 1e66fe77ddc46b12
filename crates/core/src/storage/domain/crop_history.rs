use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewStatus {
    Waiting,
    Recognized,
    NotRecognized,
}

/// Terminal outcome applied to a waiting preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreviewResolution {
    Recognized { person_name: String },
    NotRecognized { error_message: Option<String> },
}

/// Lifecycle record of one submitted face crop.
#[derive(Clone, Debug, PartialEq)]
pub struct CropPreview {
    pub id: Uuid,
    /// `None` when the cycle failed before a preview file was written.
    pub image_path: Option<PathBuf>,
    pub created_at: SystemTime,
    pub status: PreviewStatus,
    pub person_name: Option<String>,
    pub error_message: Option<String>,
}

impl CropPreview {
    pub fn waiting(id: Uuid, image_path: Option<PathBuf>, created_at: SystemTime) -> Self {
        Self {
            id,
            image_path,
            created_at,
            status: PreviewStatus::Waiting,
            person_name: None,
            error_message: None,
        }
    }

    fn resolved(&self, resolution: PreviewResolution) -> Self {
        match resolution {
            PreviewResolution::Recognized { person_name } => Self {
                status: PreviewStatus::Recognized,
                person_name: Some(person_name),
                ..self.clone()
            },
            PreviewResolution::NotRecognized { error_message } => Self {
                status: PreviewStatus::NotRecognized,
                error_message,
                ..self.clone()
            },
        }
    }
}

/// Bounded, most-recent-first list of crop previews.
///
/// Every mutation builds a new list and swaps it in under the lock, so
/// readers holding a snapshot never observe a partial update.
pub struct CropHistory {
    entries: Mutex<Arc<Vec<CropPreview>>>,
    capacity: usize,
}

impl CropHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Arc::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    /// Prepends `entry`, dropping the oldest entries beyond capacity.
    pub fn append(&self, entry: CropPreview) {
        let mut guard = self.entries.lock().unwrap();
        let mut next = Vec::with_capacity(self.capacity);
        next.push(entry);
        next.extend(guard.iter().take(self.capacity - 1).cloned());
        *guard = Arc::new(next);
    }

    /// Resolves the waiting preview with `id`. Returns `false` when no such
    /// entry is waiting (already resolved, evicted, or unknown); a preview
    /// is never resolved twice.
    pub fn resolve(&self, id: Uuid, resolution: PreviewResolution) -> bool {
        let mut guard = self.entries.lock().unwrap();
        let Some(pos) = guard
            .iter()
            .position(|e| e.id == id && e.status == PreviewStatus::Waiting)
        else {
            return false;
        };
        let mut next: Vec<CropPreview> = (**guard).clone();
        next[pos] = guard[pos].resolved(resolution);
        *guard = Arc::new(next);
        true
    }

    /// Cheap immutable view of the current list.
    pub fn snapshot(&self) -> Arc<Vec<CropPreview>> {
        self.entries.lock().unwrap().clone()
    }

    pub fn get(&self, id: Uuid) -> Option<CropPreview> {
        self.snapshot().iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
