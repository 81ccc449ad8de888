//! Shared fixtures: a call-recording in-memory driver and an ext2 image builder.

#![allow(dead_code)]

use slackscan::storage::{DeviceResolver, FileStatus, FsDriver, InodeScan, Volume};
use slackscan::{Error, InodeId, InodeMetadata, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

/// Driver calls observed by the fake driver, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenVolume(PathBuf),
    OpenScan,
    NextInode,
    ResolvePath(InodeId, InodeId),
    OpenInode(InodeId),
    CloseScan,
    CloseVolume,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// In-memory driver serving a fixed inode list.
#[derive(Clone, Default)]
pub struct MockDriver {
    pub block_size: u64,
    pub inodes: Vec<(InodeId, InodeMetadata)>,
    /// `(dir_hint, ino)` pairs that resolve.
    pub paths: HashMap<(InodeId, InodeId), PathBuf>,
    pub fail_open: bool,
    pub fail_scan_open: bool,
    /// Fail the `next_inode` call after this many inodes.
    pub fail_after: Option<usize>,
    pub log: CallLog,
}

impl MockDriver {
    pub fn new(block_size: u64, inodes: Vec<(InodeId, InodeMetadata)>) -> Self {
        Self {
            block_size,
            inodes,
            ..Default::default()
        }
    }

    pub fn with_path(mut self, dir: InodeId, ino: InodeId, path: &str) -> Self {
        self.paths.insert((dir, ino), PathBuf::from(path));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.log.borrow().iter().filter(|c| *c == call).count()
    }
}

impl FsDriver for MockDriver {
    fn open_volume(&self, device: &Path) -> Result<Box<dyn Volume>> {
        self.log.borrow_mut().push(Call::OpenVolume(device.to_path_buf()));
        if self.fail_open {
            return Err(Error::NotFound(device.display().to_string()));
        }
        Ok(Box::new(MockVolume {
            driver: self.clone(),
            closed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub struct MockVolume {
    driver: MockDriver,
    closed: bool,
}

impl MockVolume {
    fn log(&self, call: Call) {
        assert!(!self.closed, "{:?} on a closed volume", call);
        self.driver.log.borrow_mut().push(call);
    }
}

impl Volume for MockVolume {
    fn block_size(&self) -> u64 {
        self.driver.block_size
    }

    fn open_inode_scan(&mut self) -> Result<Box<dyn InodeScan>> {
        self.log(Call::OpenScan);
        if self.driver.fail_scan_open {
            return Err(Error::DataCorruption("inode tables unreadable".to_string()));
        }
        Ok(Box::new(MockScan {
            inodes: self.driver.inodes.clone(),
            position: 0,
            fail_after: self.driver.fail_after,
            log: Rc::clone(&self.driver.log),
            closed: false,
        }))
    }

    fn resolve_path(&self, dir_hint: InodeId, ino: InodeId) -> Result<PathBuf> {
        self.log(Call::ResolvePath(dir_hint, ino));
        self.driver
            .paths
            .get(&(dir_hint, ino))
            .cloned()
            .ok_or(Error::PathResolution {
                ino,
                reason: "not in directory".to_string(),
            })
    }

    fn open_inode(&self, ino: InodeId) -> Result<InodeMetadata> {
        self.log(Call::OpenInode(ino));
        self.driver
            .inodes
            .iter()
            .find(|(i, _)| *i == ino)
            .map(|(_, meta)| *meta)
            .ok_or_else(|| Error::NotFound(format!("inode {}", ino)))
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.driver.log.borrow_mut().push(Call::CloseVolume);
        }
        Ok(())
    }
}

pub struct MockScan {
    inodes: Vec<(InodeId, InodeMetadata)>,
    position: usize,
    fail_after: Option<usize>,
    log: CallLog,
    closed: bool,
}

impl InodeScan for MockScan {
    fn next_inode(&mut self) -> Result<Option<(InodeId, InodeMetadata)>> {
        assert!(!self.closed, "next_inode on a closed cursor");
        self.log.borrow_mut().push(Call::NextInode);

        if self.fail_after == Some(self.position) {
            return Err(Error::DataCorruption("bad inode table block".to_string()));
        }

        // The terminator id is returned once the list runs out
        let next = self
            .inodes
            .get(self.position)
            .copied()
            .unwrap_or((0, InodeMetadata::default()));
        self.position += 1;
        Ok(Some(next))
    }

    fn close(&mut self) {
        assert!(!self.closed, "cursor closed twice");
        self.closed = true;
        self.log.borrow_mut().push(Call::CloseScan);
    }
}

/// Resolver that maps every file to one device.
pub struct FixedResolver(pub Option<PathBuf>);

impl DeviceResolver for FixedResolver {
    fn device_for_file(&self, status: &FileStatus) -> Result<PathBuf> {
        self.0.clone().ok_or_else(|| {
            Error::NotFound(format!(
                "device {}:{} not listed",
                status.dev_major, status.dev_minor
            ))
        })
    }
}

pub fn status_for(ino: InodeId) -> FileStatus {
    FileStatus {
        dev_major: 8,
        dev_minor: 1,
        ino,
        size: 0,
        sectors: 0,
        blksize: 4096,
    }
}

// ---------------------------------------------------------------------------
// ext2 image builder
// ---------------------------------------------------------------------------

pub const BLOCK_SIZE: usize = 1024;
pub const INODE_SIZE: usize = 128;
pub const INODE_TABLE_BLOCK: usize = 5;

pub const MODE_DIR: u16 = 0o040755;
pub const MODE_FILE: u16 = 0o100644;
pub const EXTENTS_FL: u32 = 0x0008_0000;
pub const HUGE_FILE_FL: u32 = 0x0004_0000;

pub const RO_COMPAT_HUGE_FILE: u32 = 0x0008;
pub const RO_COMPAT_GDT_CSUM: u32 = 0x0010;

const FT_REG: u8 = 1;
const FT_DIR: u8 = 2;

/// A one-group ext2 image with 1 KiB blocks and 128-byte inodes.
pub struct ExtImage {
    data: Vec<u8>,
}

impl ExtImage {
    pub fn new(blocks: u32, inodes: u32) -> Self {
        let mut image = Self {
            data: vec![0u8; blocks as usize * BLOCK_SIZE],
        };

        let sb = 1024;
        image.put32(sb, inodes);
        image.put32(sb + 0x04, blocks);
        image.put32(sb + 0x14, 1);
        image.put32(sb + 0x18, 0);
        image.put32(sb + 0x20, 8192);
        image.put32(sb + 0x28, inodes);
        image.put16(sb + 0x38, 0xEF53);
        image.put32(sb + 0x4C, 1);
        image.put32(sb + 0x54, 11);
        image.put16(sb + 0x58, INODE_SIZE as u16);
        image.put32(sb + 0x60, 0x0002);

        let gd = 2 * BLOCK_SIZE;
        image.put32(gd, 3);
        image.put32(gd + 0x04, 4);
        image.put32(gd + 0x08, INODE_TABLE_BLOCK as u32);

        image
    }

    fn put16(&mut self, off: usize, v: u16) {
        self.data[off..off + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn put32(&mut self, off: usize, v: u32) {
        self.data[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn set_ro_compat(&mut self, flags: u32) {
        self.put32(1024 + 0x64, flags);
    }

    pub fn set_itable_unused(&mut self, unused: u16) {
        self.put16(2 * BLOCK_SIZE + 0x1C, unused);
    }

    /// Turn on 64-bit mode: 64-byte group descriptors and a block count
    /// high word.
    pub fn set_64bit(&mut self, blocks_count_hi: u32) {
        self.put32(1024 + 0x60, 0x0002 | 0x0080);
        self.put16(1024 + 0xFE, 64);
        self.put32(1024 + 0x150, blocks_count_hi);
    }

    /// High word of group 0's inode table location (64-bit descriptors only).
    pub fn set_inode_table_hi(&mut self, hi: u32) {
        self.put32(2 * BLOCK_SIZE + 0x28, hi);
    }

    /// High word of an inode's `i_blocks` (huge-file filesystems only).
    pub fn set_blocks_hi(&mut self, ino: u32, hi: u16) {
        let off = INODE_TABLE_BLOCK * BLOCK_SIZE + (ino as usize - 1) * INODE_SIZE;
        self.put16(off + 0x74, hi);
    }

    pub fn clear_block(&mut self, block: u32) {
        let base = block as usize * BLOCK_SIZE;
        self.data[base..base + BLOCK_SIZE].fill(0);
    }

    /// Write a depth-0 extent node holding one extent into a whole block.
    pub fn set_extent_leaf(&mut self, block: u32, start: u32, len: u16) {
        let base = block as usize * BLOCK_SIZE;
        self.put16(base, 0xF30A);
        self.put16(base + 2, 1);
        self.put16(base + 4, ((BLOCK_SIZE - 12) / 12) as u16);
        self.put16(base + 6, 0);
        self.put32(base + 12, 0);
        self.put16(base + 16, len);
        self.put16(base + 18, 0);
        self.put32(base + 20, start);
    }

    pub fn set_inode(
        &mut self,
        ino: u32,
        mode: u16,
        size: u32,
        sectors: u32,
        links: u16,
        flags: u32,
        block: [u8; 60],
    ) {
        let off = INODE_TABLE_BLOCK * BLOCK_SIZE + (ino as usize - 1) * INODE_SIZE;
        self.put16(off, mode);
        self.put32(off + 0x04, size);
        self.put16(off + 0x1A, links);
        self.put32(off + 0x1C, sectors);
        self.put32(off + 0x20, flags);
        self.data[off + 0x28..off + 0x28 + 60].copy_from_slice(&block);
    }

    /// Write `(ino, name, is_dir)` entries into one directory block.
    pub fn set_dir_block(&mut self, block: u32, entries: &[(u32, &str, bool)]) {
        let base = block as usize * BLOCK_SIZE;
        let mut off = 0usize;

        for (i, (ino, name, is_dir)) in entries.iter().enumerate() {
            let rec_len = if i + 1 == entries.len() {
                BLOCK_SIZE - off
            } else {
                (8 + name.len() + 3) & !3
            };
            let at = base + off;
            self.put32(at, *ino);
            self.put16(at + 4, rec_len as u16);
            self.data[at + 6] = name.len() as u8;
            self.data[at + 7] = if *is_dir { FT_DIR } else { FT_REG };
            self.data[at + 8..at + 8 + name.len()].copy_from_slice(name.as_bytes());
            off += rec_len;
        }
    }

    /// Write raw 32-bit block pointers at the start of a block.
    pub fn set_pointers(&mut self, block: u32, pointers: &[u32]) {
        let base = block as usize * BLOCK_SIZE;
        for (i, p) in pointers.iter().enumerate() {
            self.put32(base + i * 4, *p);
        }
    }

    pub fn write(&self, dir: &TempDir) -> PathBuf {
        let path = dir.path().join("ext2.img");
        std::fs::write(&path, &self.data).expect("failed to write image");
        path
    }
}

/// `i_block` holding direct (and optionally indirect) block pointers.
pub fn block_map(direct: &[u32], indirect: u32) -> [u8; 60] {
    let mut block = [0u8; 60];
    for (i, b) in direct.iter().enumerate() {
        block[i * 4..i * 4 + 4].copy_from_slice(&b.to_le_bytes());
    }
    block[48..52].copy_from_slice(&indirect.to_le_bytes());
    block
}

/// `i_block` holding a depth-0 extent tree with one extent.
pub fn extent_root(start: u32, len: u16) -> [u8; 60] {
    let mut block = [0u8; 60];
    block[0..2].copy_from_slice(&0xF30Au16.to_le_bytes());
    block[2..4].copy_from_slice(&1u16.to_le_bytes());
    block[4..6].copy_from_slice(&4u16.to_le_bytes());
    block[12..16].copy_from_slice(&0u32.to_le_bytes());
    block[16..18].copy_from_slice(&len.to_le_bytes());
    block[20..24].copy_from_slice(&start.to_le_bytes());
    block
}

/// `i_block` holding a depth-1 extent tree whose one index entry points at
/// the leaf node in `leaf`.
pub fn extent_index_root(leaf: u32) -> [u8; 60] {
    let mut block = [0u8; 60];
    block[0..2].copy_from_slice(&0xF30Au16.to_le_bytes());
    block[2..4].copy_from_slice(&1u16.to_le_bytes());
    block[4..6].copy_from_slice(&4u16.to_le_bytes());
    block[6..8].copy_from_slice(&1u16.to_le_bytes());
    block[12..16].copy_from_slice(&0u32.to_le_bytes());
    block[16..20].copy_from_slice(&leaf.to_le_bytes());
    block
}

/// Image with a root directory, a `docs` directory, two files and one
/// unlinked inode:
///
/// | ino | what               | size | blocks | slack |
/// |-----|--------------------|------|--------|-------|
/// | 2   | `/`                | 1024 | 1      | 0     |
/// | 11  | `/docs` (extents)  | 1024 | 1      | 0     |
/// | 12  | `/readme.txt`      | 100  | 1      | 924   |
/// | 13  | `/docs/report.txt` | 3000 | 3      | 72    |
/// | 14  | unlinked           | 500  | 1      | 524   |
///
/// The remaining 27 of 32 inode slots are empty.
pub fn standard_image() -> ExtImage {
    let mut image = ExtImage::new(64, 32);

    image.set_inode(2, MODE_DIR, 1024, 2, 3, 0, block_map(&[9], 0));
    image.set_inode(11, MODE_DIR, 1024, 2, 2, EXTENTS_FL, extent_root(10, 1));
    image.set_inode(12, MODE_FILE, 100, 2, 1, 0, block_map(&[11], 0));
    image.set_inode(13, MODE_FILE, 3000, 6, 1, 0, block_map(&[12, 13, 14], 0));
    image.set_inode(14, MODE_FILE, 500, 2, 0, 0, block_map(&[15], 0));

    image.set_dir_block(
        9,
        &[
            (2, ".", true),
            (2, "..", true),
            (11, "docs", true),
            (12, "readme.txt", false),
        ],
    );
    image.set_dir_block(
        10,
        &[(11, ".", true), (2, "..", true), (13, "report.txt", false)],
    );

    image
}
