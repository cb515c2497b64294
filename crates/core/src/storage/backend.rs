use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::errors::CoreError;

const ENTRY_EXTENSION: &str = "json";

/// Distinguishes temp files of concurrent writers within one process.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Byte store addressed by flat string names.
///
/// Implementations must tolerate concurrent calls for the same name; the
/// last writer wins and a reader never sees a half-written entry.
pub trait CacheBackend: Send + Sync {
    /// `Ok(None)` when the entry does not exist.
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, CoreError>;

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), CoreError>;

    /// Deleting a missing entry is not an error.
    fn delete(&self, name: &str) -> Result<(), CoreError>;

    /// Names of every stored entry.
    fn list(&self) -> Result<Vec<String>, CoreError>;
}

/// One file per entry inside a directory.
///
/// Writes go to a unique temporary sibling and are renamed into place, so a
/// concurrent reader sees either the old entry or the new one.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{ENTRY_EXTENSION}"))
    }
}

impl CacheBackend for FileBackend {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, CoreError> {
        match std::fs::read(self.entry_path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), CoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{name}.{}.{seq}.tmp", std::process::id()));
        std::fs::write(&tmp, bytes)?;
        if let Err(e) = std::fs::rename(&tmp, self.entry_path(name)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), CoreError> {
        match std::fs::remove_file(self.entry_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>, CoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Process-local backend, used by tests and embedders without a disk.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheBackend for MemoryBackend {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self.lock().get(name).cloned())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), CoreError> {
        self.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), CoreError> {
        self.lock().remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, CoreError> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
