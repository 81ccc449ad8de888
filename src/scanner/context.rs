//! Scoped ownership of the resources one scan holds.

use crate::accounting::{InodeId, InodeMetadata, SCAN_TERMINATOR};
use crate::error::{Error, Result};
use crate::storage::{FsDriver, InodeScan, Volume};
use std::path::{Path, PathBuf};
use tracing::warn;

/// The volume handle, optional inode cursor and path hint of one scan.
///
/// Resources are released once, either through `release` or on drop,
/// whichever comes first.
pub struct ScanContext {
    target: String,
    volume: Option<Box<dyn Volume>>,
    cursor: Option<Box<dyn InodeScan>>,
    path_hint: InodeId,
}

impl ScanContext {
    /// Open the volume on `device`.
    pub fn open(driver: &dyn FsDriver, device: &Path) -> Result<Self> {
        let target = device.display().to_string();
        let volume = driver
            .open_volume(device)
            .map_err(|e| Error::open_failure(&target, e))?;

        Ok(Self {
            target,
            volume: Some(volume),
            cursor: None,
            path_hint: SCAN_TERMINATOR,
        })
    }

    /// Display name of the scan target.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Last directory seen in enumeration order.
    ///
    /// This is a guess at the parent of the inodes that follow, not a
    /// parent/child relation: enumeration is in inode order, so files are
    /// attributed to whichever directory happened to precede them.
    pub fn path_hint(&self) -> InodeId {
        self.path_hint
    }

    /// Record a directory inode as the new path hint.
    pub fn enter_directory(&mut self, ino: InodeId) {
        self.path_hint = ino;
    }

    fn volume(&self) -> Result<&dyn Volume> {
        self.volume
            .as_deref()
            .ok_or_else(|| Error::Unsupported("scan context already released".to_string()))
    }

    /// Block size of the open volume.
    pub fn block_size(&self) -> Result<u64> {
        Ok(self.volume()?.block_size())
    }

    /// Start the inode walk.
    pub fn begin_scan(&mut self) -> Result<()> {
        let volume = self
            .volume
            .as_deref_mut()
            .ok_or_else(|| Error::Unsupported("scan context already released".to_string()))?;
        self.cursor = Some(volume.open_inode_scan()?);
        self.path_hint = SCAN_TERMINATOR;
        Ok(())
    }

    /// Advance the cursor. `None` once the walk is over.
    pub fn next_inode(&mut self) -> Result<Option<(InodeId, InodeMetadata)>> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| Error::Unsupported("no inode scan in progress".to_string()))?;
        match cursor.next_inode()? {
            Some((ino, _)) if ino == SCAN_TERMINATOR => Ok(None),
            other => Ok(other),
        }
    }

    /// Resolve a path for `ino` through the current path hint.
    pub fn resolve_path(&self, ino: InodeId) -> Result<PathBuf> {
        self.volume()?.resolve_path(self.path_hint, ino)
    }

    /// Read one inode directly.
    pub fn open_inode(&self, ino: InodeId) -> Result<InodeMetadata> {
        self.volume()?.open_inode(ino)
    }

    /// Whether the cursor and handle have been released.
    pub fn is_released(&self) -> bool {
        self.volume.is_none() && self.cursor.is_none()
    }

    /// Close the cursor, then the volume. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
        if let Some(mut volume) = self.volume.take() {
            if let Err(e) = volume.close() {
                warn!(volume = %self.target, error = %e, "failed to close volume");
            }
        }
    }
}

impl Drop for ScanContext {
    fn drop(&mut self) {
        self.release();
    }
}
