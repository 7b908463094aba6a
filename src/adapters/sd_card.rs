//! SD card storage adapter.
//!
//! Implements [`StoragePort`] over `std::fs` rooted at a directory.
//!
//! - **`target_os = "espidf"`**: the root is the FAT VFS mount point
//!   (`/sdcard`) set up in `main()`.
//! - **all other targets**: any host directory, which makes the adapter
//!   usable for simulation and integration tests.
//!
//! Port paths are absolute from the card root (`"/061024.txt"`) and are
//! never allowed to climb out of it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use log::warn;

use crate::app::ports::StoragePort;
use crate::error::StorageError;

pub struct SdCardStorage {
    root: PathBuf,
}

impl SdCardStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = relative_path(path)?;
        if !self.is_mounted() {
            return Err(StorageError::NotMounted);
        }
        Ok(self.root.join(relative))
    }
}

/// Port path (`"/a/b.txt"`) as a path below a mount root.  Empty paths
/// and `..` components are refused.
pub(crate) fn relative_path(path: &str) -> Result<&Path, StorageError> {
    let relative = Path::new(path.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || !relative.components().all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidPath);
    }
    Ok(relative)
}

pub(crate) fn map_io(e: &io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound,
        _ => StorageError::Io,
    }
}

impl StoragePort for SdCardStorage {
    fn is_mounted(&self) -> bool {
        self.root.is_dir()
    }

    fn read_to_string(&self, path: &str) -> Result<String, StorageError> {
        fs::read_to_string(self.resolve(path)?).map_err(|e| map_io(&e))
    }

    fn read_chunk(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut file = File::open(self.resolve(path)?).map_err(|e| map_io(&e))?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| map_io(&e))?;
        file.read(buf).map_err(|e| map_io(&e))
    }

    fn write(&mut self, path: &str, contents: &str) -> Result<(), StorageError> {
        fs::write(self.resolve(path)?, contents).map_err(|e| {
            warn!("SD: write {} failed: {}", path, e);
            map_io(&e)
        })
    }

    fn append(&mut self, path: &str, contents: &str) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(path)?)
            .map_err(|e| map_io(&e))?;
        file.write_all(contents.as_bytes()).map_err(|e| {
            warn!("SD: append {} failed: {}", path, e);
            map_io(&e)
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_file())
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        fs::remove_file(self.resolve(path)?).map_err(|e| map_io(&e))
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        if !self.is_mounted() {
            return Err(StorageError::NotMounted);
        }
        let mut names: Vec<String> = fs::read_dir(&self.root)
            .map_err(|e| map_io(&e))?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }
}
