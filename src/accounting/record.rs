//! Per-inode accounting records.

use crate::accounting::slack::calc_slack;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of an inode within one volume.
pub type InodeId = u64;

/// Inode id a scan cursor returns once enumeration is exhausted. Never a valid inode.
pub const SCAN_TERMINATOR: InodeId = 0;

/// Driver-supplied facts about one inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InodeMetadata {
    /// Logical size in bytes.
    pub size: u64,
    /// Allocated filesystem blocks.
    pub blocks: u64,
    /// Whether the inode is a directory.
    pub is_dir: bool,
    /// Hard link count.
    pub links: u32,
}

impl InodeMetadata {
    /// Metadata of a regular file.
    pub fn file(size: u64, blocks: u64) -> Self {
        Self {
            size,
            blocks,
            is_dir: false,
            links: 1,
        }
    }

    /// Metadata of a directory.
    pub fn directory(size: u64, blocks: u64) -> Self {
        Self {
            size,
            blocks,
            is_dir: true,
            links: 2,
        }
    }

    /// Whether any directory entry still references the inode.
    pub fn is_linked(&self) -> bool {
        self.links != 0
    }
}

/// Computed slack facts for one inode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackRecord {
    /// Inode number.
    pub ino: InodeId,
    /// Best-effort path, absent when it could not be resolved.
    pub path: Option<PathBuf>,
    /// Logical size in bytes.
    pub size: u64,
    /// Allocated filesystem blocks.
    pub blocks: u64,
    /// Unused tail bytes.
    pub slack: u64,
    /// Block size the slack was computed with.
    pub block_size: u64,
}

impl SlackRecord {
    /// Build the record of `ino` from its metadata.
    pub fn new(ino: InodeId, meta: &InodeMetadata, block_size: u64) -> Self {
        Self {
            ino,
            path: None,
            size: meta.size,
            blocks: meta.blocks,
            slack: calc_slack(block_size, meta.blocks, meta.size),
            block_size,
        }
    }

    /// Attach a resolved path.
    pub fn with_path(mut self, path: Option<PathBuf>) -> Self {
        self.path = path;
        self
    }
}
