//! Mapping a file to the block device that holds it.
//!
//! The device number from the file's stat metadata is looked up in the
//! kernel partition listing, whose lines read `major minor #blocks name`.

use crate::accounting::InodeId;
use crate::config::SECTOR_SIZE;
use crate::error::{Error, Result};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// OS-level status of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStatus {
    /// Major number of the containing device.
    pub dev_major: u32,
    /// Minor number of the containing device.
    pub dev_minor: u32,
    /// Inode number on that device.
    pub ino: InodeId,
    /// Logical size in bytes.
    pub size: u64,
    /// Allocated 512-byte sectors (`st_blocks`).
    pub sectors: u64,
    /// Preferred I/O block size (`st_blksize`).
    pub blksize: u64,
}

impl FileStatus {
    /// Stat `path`.
    #[cfg(unix)]
    pub fn of(path: &Path) -> Result<Self> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata(path).map_err(|e| Error::DeviceResolution {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let dev = meta.dev() as libc::dev_t;

        Ok(Self {
            dev_major: libc::major(dev) as u32,
            dev_minor: libc::minor(dev) as u32,
            ino: meta.ino(),
            size: meta.size(),
            sectors: meta.blocks(),
            blksize: meta.blksize(),
        })
    }

    #[cfg(not(unix))]
    pub fn of(path: &Path) -> Result<Self> {
        Err(Error::DeviceResolution {
            path: path.to_path_buf(),
            reason: "device numbers are not available on this platform".to_string(),
        })
    }

    /// Allocated space in units of `blksize`, rounded up.
    pub fn blocks(&self) -> u64 {
        if self.blksize == 0 {
            return 0;
        }
        (self.sectors * SECTOR_SIZE).div_ceil(self.blksize)
    }
}

/// Maps file status to a block device path.
pub trait DeviceResolver {
    /// Find the device holding the file described by `status`.
    fn device_for_file(&self, status: &FileStatus) -> Result<PathBuf>;
}

/// Resolver backed by a partition listing such as `/proc/partitions`.
#[derive(Debug, Clone)]
pub struct PartitionTable {
    listing: PathBuf,
    device_dir: PathBuf,
}

impl PartitionTable {
    pub fn new(listing: impl Into<PathBuf>, device_dir: impl Into<PathBuf>) -> Self {
        Self {
            listing: listing.into(),
            device_dir: device_dir.into(),
        }
    }

    /// Find the device name registered under `major:minor`.
    pub fn lookup(&self, major: u32, minor: u32) -> Result<Option<String>> {
        let file = std::fs::File::open(&self.listing)?;
        let reader = BufReader::new(file);

        for line in reader.lines() {
            let line = line?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                continue;
            }

            // Header line and anything else that is not `major minor blocks name`
            let (Ok(maj), Ok(min)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>()) else {
                continue;
            };

            if maj == major && min == minor {
                return Ok(Some(parts[3].to_string()));
            }
        }

        Ok(None)
    }
}

impl DeviceResolver for PartitionTable {
    fn device_for_file(&self, status: &FileStatus) -> Result<PathBuf> {
        let name = self
            .lookup(status.dev_major, status.dev_minor)
            .map_err(|e| Error::NotFound(format!("{}: {}", self.listing.display(), e)))?;

        match name {
            Some(name) => Ok(self.device_dir.join(name)),
            None => Err(Error::NotFound(format!(
                "device {}:{} is not listed in {}",
                status.dev_major,
                status.dev_minor,
                self.listing.display()
            ))),
        }
    }
}
