//! File-based locking: один экземпляр EmoKv на store.
//!
//! Advisory lock (fs2) на файле `<dir>/<name>.lock`:
//! - try_lock_exclusive при открытии; занят — OpenError::Locked;
//! - снимается в Drop.

use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::consts::LOCK_FILE_EXT;
use crate::error::OpenError;

pub struct StoreLock {
    file: std::fs::File,
    path: PathBuf,
}

impl StoreLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // fs2 unlock errors on drop are ignored deliberately.
        let _ = self.file.unlock();
    }
}

pub fn lock_file_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, LOCK_FILE_EXT))
}

/// Захватить эксклюзивный lock без ожидания.
pub fn try_lock_store(dir: &Path, name: &str) -> Result<StoreLock, OpenError> {
    let path = lock_file_path(dir, name);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|e| OpenError::Io {
            path: path.clone(),
            source: e,
        })?;
    if file.try_lock_exclusive().is_err() {
        return Err(OpenError::Locked { path });
    }
    Ok(StoreLock { file, path })
}
