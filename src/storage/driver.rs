//! Filesystem driver abstraction.
//!
//! The scanners only talk to a volume through these traits, so the ext
//! reader can be swapped for another format or an in-memory fake.

use crate::accounting::{InodeId, InodeMetadata};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Opens volumes by device identifier.
pub trait FsDriver {
    /// Open the filesystem on `device`.
    ///
    /// Fails with `NotFound`, `PermissionDenied` or `Unsupported` when the
    /// device is missing, unreadable or not in a recognised format.
    fn open_volume(&self, device: &Path) -> Result<Box<dyn Volume>>;

    /// Name of this driver (for logging).
    fn name(&self) -> &'static str;
}

/// An open filesystem handle.
pub trait Volume {
    /// Block size of the filesystem.
    fn block_size(&self) -> u64;

    /// Start a walk over every inode in driver-defined order.
    fn open_inode_scan(&mut self) -> Result<Box<dyn InodeScan>>;

    /// Build a path for `ino`, looking it up in the directory `dir_hint`.
    ///
    /// The hint is only a guess at the parent; failure is expected and
    /// never fatal to a scan.
    fn resolve_path(&self, dir_hint: InodeId, ino: InodeId) -> Result<PathBuf>;

    /// Read the metadata of one inode without walking the volume.
    fn open_inode(&self, ino: InodeId) -> Result<InodeMetadata>;

    /// Release the handle. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Cursor over the inodes of a volume.
pub trait InodeScan {
    /// Advance to the next inode.
    ///
    /// Returns `None` (or an inode id of `SCAN_TERMINATOR`) once every inode
    /// has been visited.
    fn next_inode(&mut self) -> Result<Option<(InodeId, InodeMetadata)>>;

    /// Release the cursor.
    fn close(&mut self);
}
