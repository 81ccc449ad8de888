//! Read-only ext2/ext3/ext4 driver.

mod block_device;
mod ext4;

use crate::accounting::{InodeId, InodeMetadata, SCAN_TERMINATOR};
use crate::error::{Error, Result};
use crate::storage::driver::{FsDriver, InodeScan, Volume};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub use block_device::BlockDevice;
pub use ext4::{DirEntry, Ext4Inode, Ext4Parser, Ext4Superblock, GroupDesc};

/// Driver for the ext family of filesystems.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtDriver;

impl FsDriver for ExtDriver {
    fn open_volume(&self, device: &Path) -> Result<Box<dyn Volume>> {
        let parser = Ext4Parser::open(device)?;
        Ok(Box::new(ExtVolume {
            fs: Some(Arc::new(parser)),
            dir_cache: RefCell::new(None),
        }))
    }

    fn name(&self) -> &'static str {
        "ext2/ext3/ext4"
    }
}

fn to_metadata(fs: &Ext4Parser, inode: &Ext4Inode) -> InodeMetadata {
    InodeMetadata {
        size: inode.size,
        blocks: fs.allocated_blocks(inode),
        is_dir: inode.is_dir(),
        links: inode.links as u32,
    }
}

/// The directory most recently used for path lookups.
struct CachedDir {
    ino: InodeId,
    listing: DirListing,
}

enum DirListing {
    Read { path: PathBuf, entries: Vec<DirEntry> },
    /// Reading the directory failed; later lookups through it fail alike.
    Failed(String),
}

/// An open ext volume.
pub struct ExtVolume {
    fs: Option<Arc<Ext4Parser>>,
    dir_cache: RefCell<Option<CachedDir>>,
}

impl ExtVolume {
    fn fs(&self) -> Result<&Arc<Ext4Parser>> {
        self.fs
            .as_ref()
            .ok_or_else(|| Error::Unsupported("operation on a closed volume".to_string()))
    }

    /// Path of `ino` through directory `dir_hint`, or why it has none.
    fn lookup(&self, dir_hint: InodeId, ino: InodeId) -> std::result::Result<PathBuf, String> {
        let fs = self.fs().map_err(|e| e.to_string())?;
        let mut cache = self.dir_cache.borrow_mut();

        let stale = cache.as_ref().map_or(true, |c| c.ino != dir_hint);
        if stale {
            let read = fs
                .dir_path(dir_hint)
                .and_then(|path| Ok((path, fs.read_dir(dir_hint)?)));
            let listing = match read {
                Ok((path, entries)) => DirListing::Read { path, entries },
                Err(e) => {
                    debug!(dir = dir_hint, error = %e, "directory unreadable");
                    DirListing::Failed(e.to_string())
                }
            };
            *cache = Some(CachedDir {
                ino: dir_hint,
                listing,
            });
        }

        let (path, entries) = match cache.as_ref().map(|c| &c.listing) {
            Some(DirListing::Read { path, entries }) => (path, entries),
            Some(DirListing::Failed(reason)) => return Err(reason.clone()),
            None => return Err("directory cache empty".to_string()),
        };
        if ino == dir_hint {
            return Ok(path.clone());
        }

        entries
            .iter()
            .find(|e| e.ino == ino && !e.is_dot())
            .map(|e| path.join(&e.name))
            .ok_or_else(|| format!("no entry in directory {}", dir_hint))
    }
}

impl Volume for ExtVolume {
    fn block_size(&self) -> u64 {
        self.fs.as_ref().map_or(0, |fs| fs.block_size())
    }

    fn open_inode_scan(&mut self) -> Result<Box<dyn InodeScan>> {
        let fs = Arc::clone(self.fs()?);
        Ok(Box::new(ExtInodeScan {
            fs: Some(fs),
            next_group: 0,
            group: 0,
            index: 0,
            limit: 0,
            table: Vec::new(),
        }))
    }

    fn resolve_path(&self, dir_hint: InodeId, ino: InodeId) -> Result<PathBuf> {
        if dir_hint == SCAN_TERMINATOR {
            return Err(Error::PathResolution {
                ino,
                reason: "no directory seen yet".to_string(),
            });
        }
        self.lookup(dir_hint, ino)
            .map_err(|reason| Error::PathResolution { ino, reason })
    }

    fn open_inode(&self, ino: InodeId) -> Result<InodeMetadata> {
        let fs = self.fs()?;
        let inode = fs.read_inode(ino)?;
        Ok(to_metadata(fs, &inode))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(fs) = self.fs.take() {
            debug!(device = %fs.device_path().display(), "closing ext volume");
        }
        self.dir_cache.borrow_mut().take();
        Ok(())
    }
}

/// Inode cursor reading one group's inode table at a time.
pub struct ExtInodeScan {
    fs: Option<Arc<Ext4Parser>>,
    next_group: u32,
    group: u32,
    index: u32,
    limit: u32,
    table: Vec<u8>,
}

impl InodeScan for ExtInodeScan {
    fn next_inode(&mut self) -> Result<Option<(InodeId, InodeMetadata)>> {
        let Some(fs) = self.fs.as_ref() else {
            return Ok(None);
        };

        loop {
            if self.index < self.limit {
                let inode = fs.inode_in_table(&self.table, self.index)?;
                let ino = self.group as u64 * fs.superblock().inodes_per_group as u64
                    + self.index as u64
                    + 1;
                self.index += 1;
                return Ok(Some((ino, to_metadata(fs, &inode))));
            }

            if self.next_group >= fs.superblock().group_count() {
                return Ok(None);
            }

            let group = self.next_group;
            self.next_group += 1;

            let desc = fs.group(group)?;
            let limit = fs.scan_limit(group, &desc);
            if limit == 0 {
                debug!(group, "skipping uninitialized inode group");
                continue;
            }

            self.table = fs.read_inode_table(&desc, limit)?;
            self.group = group;
            self.index = 0;
            self.limit = limit;
        }
    }

    fn close(&mut self) {
        self.fs = None;
        self.table = Vec::new();
        self.limit = 0;
    }
}
