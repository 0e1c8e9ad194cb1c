//! Note storage.
//!
//! All paths handed to a [`NoteStore`] are relative to the vault root.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where notes and the pointer file are written.
pub trait NoteStore {
    fn exists(&self, path: &Path) -> bool;

    /// Write a note, creating parent folders as needed. An interrupted write
    /// must not leave a partial note behind, since existing notes are never
    /// rewritten.
    fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    fn read_pointer(&self, path: &Path) -> io::Result<Option<String>>;

    /// Replace the file so a concurrent reader sees either the old or the new
    /// content, never a partial write.
    fn write_pointer_atomic(&self, path: &Path, content: &str) -> io::Result<()>;
}

/// Vault on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsNoteStore {
    root: PathBuf,
}

impl FsNoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsNoteStore { root: root.into() }
    }

    fn full_path(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl NoteStore for FsNoteStore {
    fn exists(&self, path: &Path) -> bool {
        self.full_path(path).exists()
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        write_atomic(&self.full_path(path), content.as_bytes())
    }

    fn read_pointer(&self, path: &Path) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.full_path(path)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_pointer_atomic(&self, path: &Path, content: &str) -> io::Result<()> {
        write_atomic(&self.full_path(path), content.as_bytes())
    }
}

/// Write `contents` next to `path` under a temporary name, then rename over it.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".tmp");
    let temp = dir.join(temp_name);

    std::fs::write(&temp, contents)?;
    std::fs::rename(&temp, path)
}

/// In-memory vault, used for dry runs.
#[derive(Debug, Default)]
pub struct MemoryNoteStore {
    notes: Mutex<BTreeMap<PathBuf, String>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn notes(&self) -> MutexGuard<'_, BTreeMap<PathBuf, String>> {
        self.notes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.notes().get(path).cloned()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.notes().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.notes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes().is_empty()
    }
}

impl NoteStore for MemoryNoteStore {
    fn exists(&self, path: &Path) -> bool {
        self.notes().contains_key(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        self.notes().insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn read_pointer(&self, path: &Path) -> io::Result<Option<String>> {
        Ok(self.get(path))
    }

    fn write_pointer_atomic(&self, path: &Path, content: &str) -> io::Result<()> {
        self.write(path, content)
    }
}
