//! Flash asset adapter.
//!
//! The SPIFFS partition holds the web pages and the preset zone tables
//! that ship with the firmware image.  The device never writes there; a
//! client may only delete.  SPIFFS answers `stat` on its own mount point
//! with an error, so whether it is mounted is recorded at mount time
//! instead of probed.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::adapters::sd_card::{map_io, relative_path};
use crate::app::ports::StoragePort;
use crate::error::StorageError;

pub struct FlashAssets {
    root: PathBuf,
    mounted: bool,
}

impl FlashAssets {
    pub fn new(root: impl Into<PathBuf>, mounted: bool) -> Self {
        Self {
            root: root.into(),
            mounted,
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = relative_path(path)?;
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        Ok(self.root.join(relative))
    }
}

impl StoragePort for FlashAssets {
    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn read_to_string(&self, path: &str) -> Result<String, StorageError> {
        fs::read_to_string(self.resolve(path)?).map_err(|e| map_io(&e))
    }

    fn read_chunk(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut file = File::open(self.resolve(path)?).map_err(|e| map_io(&e))?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| map_io(&e))?;
        file.read(buf).map_err(|e| map_io(&e))
    }

    fn write(&mut self, _path: &str, _contents: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }

    fn append(&mut self, _path: &str, _contents: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_file())
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        fs::remove_file(self.resolve(path)?).map_err(|e| map_io(&e))
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        let mut names: Vec<String> = fs::read_dir(&self.root)
            .map_err(|e| map_io(&e))?
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }
}
