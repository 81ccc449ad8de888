//! Read-only access to a block device or filesystem image.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Handle for raw, read-only device access.
#[derive(Debug)]
pub struct BlockDevice {
    file: File,
    path: PathBuf,
}

impl BlockDevice {
    /// Open a block device (or image file) for reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| Error::from_open_io(path, e))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path the device was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `len` bytes at `offset`.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::DataCorruption(format!(
                    "{}: read of {} bytes at offset {} runs past the end of the device",
                    self.path.display(),
                    len,
                    offset
                ))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(buf)
    }
}
