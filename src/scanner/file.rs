//! Slack of a single file, read straight from its inode.

use crate::accounting::{ScanTotals, SlackRecord};
use crate::error::{Error, Result};
use crate::scanner::context::ScanContext;
use crate::storage::{DeviceResolver, FileStatus, FsDriver};
use std::path::{Path, PathBuf};
use tracing::info;

/// Result of a single-file scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileScan {
    /// Device the inode was read from. `None` for stat-only estimates.
    pub device: Option<PathBuf>,
    pub record: SlackRecord,
    pub totals: ScanTotals,
}

impl FileScan {
    fn new(device: Option<PathBuf>, record: SlackRecord) -> Self {
        let mut totals = ScanTotals::default();
        totals.add(&record);
        Self {
            device,
            record,
            totals,
        }
    }
}

/// Scans single files through the filesystem driver.
pub struct FileScanner<'a> {
    driver: &'a dyn FsDriver,
    resolver: &'a dyn DeviceResolver,
}

impl<'a> FileScanner<'a> {
    pub fn new(driver: &'a dyn FsDriver, resolver: &'a dyn DeviceResolver) -> Self {
        Self { driver, resolver }
    }

    /// Stat `path`, find its device and read its inode from the volume.
    pub fn scan(&self, path: &Path) -> Result<FileScan> {
        let status = FileStatus::of(path)?;
        self.scan_status(path, &status)
    }

    /// Like `scan`, with the stat metadata already at hand.
    pub fn scan_status(&self, path: &Path, status: &FileStatus) -> Result<FileScan> {
        let device =
            self.resolver
                .device_for_file(status)
                .map_err(|e| Error::DeviceResolution {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;

        info!(file = %path.display(), device = %device.display(), ino = status.ino, "scanning file");

        let ctx = ScanContext::open(self.driver, &device)?;
        let block_size = ctx.block_size()?;
        let meta = ctx
            .open_inode(status.ino)
            .map_err(|e| Error::open_failure(path.display().to_string(), e))?;

        let record =
            SlackRecord::new(status.ino, &meta, block_size).with_path(Some(path.to_path_buf()));
        Ok(FileScan::new(Some(device), record))
    }
}

/// Estimate a file's slack from OS stat metadata alone.
///
/// Needs no access to the raw device. The allocation unit is `st_blksize`,
/// which usually but not always equals the filesystem block size.
pub fn estimate_from_status(path: &Path, status: &FileStatus) -> FileScan {
    let meta = crate::accounting::InodeMetadata::file(status.size, status.blocks());
    let record =
        SlackRecord::new(status.ino, &meta, status.blksize).with_path(Some(path.to_path_buf()));
    FileScan::new(None, record)
}
