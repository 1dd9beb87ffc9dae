//! Filesystem-backed file store
//!
//! One flat directory; files are written once under their content-derived
//! name and never modified afterwards.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage directory unavailable: {}", .0.display())]
    Unavailable(PathBuf),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("{0} is protected from deletion")]
    Protected(String),

    #[error("existing file {0} holds different content under the same address")]
    Collision(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of [`FileStore::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Bytes were written under the name
    Stored,
    /// A file with that name was already present and left untouched
    AlreadyExists,
}

/// A file found in the storage directory
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
    /// Last write time reported by the filesystem
    pub modified: SystemTime,
}

/// Flat directory of immutable files
///
/// Writes go to a hidden temporary file first and are renamed into place,
/// so a reader never sees a partially written file.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open the store, creating the directory if it does not exist
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        log::info!("File store opened at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that the directory is still there
    fn ensure_available(&self) -> StoreResult<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(self.root.clone()))
        }
    }

    /// Resolve a name to its path inside the root
    fn path_for(&self, name: &str) -> StoreResult<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    pub fn exists(&self, name: &str) -> StoreResult<bool> {
        let path = self.path_for(name)?;
        self.ensure_available()?;
        Ok(path.try_exists()?)
    }

    /// Write `data` under `name` unless a file of that name already exists.
    pub fn put(&self, name: &str, data: &[u8]) -> StoreResult<PutOutcome> {
        let path = self.path_for(name)?;
        self.ensure_available()?;

        // Skip if already exists (deduplication)
        if path.try_exists()? {
            return Ok(PutOutcome::AlreadyExists);
        }

        let tmp_path = self.root.join(format!(".{}.tmp", name));
        let written = write_synced(&tmp_path, data).and_then(|_| fs::rename(&tmp_path, &path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        log::debug!("Wrote {} ({} bytes)", name, data.len());
        Ok(PutOutcome::Stored)
    }

    /// Read a stored file back
    pub fn read(&self, name: &str) -> StoreResult<Vec<u8>> {
        let path = self.path_for(name)?;
        self.ensure_available()?;
        Ok(fs::read(path)?)
    }

    /// Last write time of a stored file
    pub fn modified(&self, name: &str) -> StoreResult<SystemTime> {
        let path = self.path_for(name)?;
        Ok(fs::metadata(path)?.modified()?)
    }

    /// Delete a file by name.
    /// Returns true if the file was deleted, false if it didn't exist
    pub fn delete(&self, name: &str) -> StoreResult<bool> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List every regular file in the directory with its last write time.
    ///
    /// Hidden files, which include in-flight temporaries, are skipped.
    pub fn list_all(&self) -> StoreResult<Vec<StoredFile>> {
        self.ensure_available()?;

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if !file_type.is_file() {
                continue;
            }

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    log::warn!("Skipping non UTF-8 file name {:?}", raw);
                    continue;
                }
            };
            if name.starts_with('.') {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            files.push(StoredFile {
                name,
                path: entry.path(),
                modified,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Delete temporaries left behind by writes that never reached the rename.
    /// Returns how many were removed
    pub fn remove_stale_temps(&self) -> StoreResult<usize> {
        self.ensure_available()?;

        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let stale = name
                .to_str()
                .is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"));
            if !stale {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    log::info!("Removed stale temporary {}", entry.path().display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}
