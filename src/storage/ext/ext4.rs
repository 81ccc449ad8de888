//! Ext2/ext3/ext4 on-disk structures.
//!
//! Parses the superblock, block group descriptors, inodes, extent trees,
//! indirect block maps and directory blocks. Read-only.

use crate::accounting::InodeId;
use crate::config::{ext_params, SECTOR_SIZE};
use crate::error::{Error, Result};
use crate::storage::ext::BlockDevice;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const INCOMPAT_FILETYPE: u32 = 0x0002;
const INCOMPAT_64BIT: u32 = 0x0080;

const RO_COMPAT_HUGE_FILE: u32 = 0x0008;
const RO_COMPAT_GDT_CSUM: u32 = 0x0010;
const RO_COMPAT_METADATA_CSUM: u32 = 0x0400;

const BG_INODE_UNINIT: u16 = 0x0001;

const HUGE_FILE_FL: u32 = 0x0004_0000;
const EXTENTS_FL: u32 = 0x0008_0000;
const INLINE_DATA_FL: u32 = 0x1000_0000;

const S_IFMT: u16 = 0xF000;
const S_IFDIR: u16 = 0x4000;

const EXTENT_MAGIC: u16 = 0xF30A;
const EXTENT_MAX_DEPTH: u16 = 5;
const EXTENT_INIT_MAX_LEN: u16 = 32768;

/// Direct pointers in a block map.
const NDIR_BLOCKS: usize = 12;

fn le16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

fn le32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

/// Ext superblock (key fields only).
#[derive(Debug, Clone)]
pub struct Ext4Superblock {
    pub inodes_count: u32,
    pub blocks_count: u64,
    pub block_size: u64,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub inode_size: u16,
    pub first_data_block: u32,
    pub desc_size: u16,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
}

impl Ext4Superblock {
    /// Parse the superblock from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ext_params::SUPERBLOCK_SIZE {
            return Err(Error::DataCorruption("Superblock too small".to_string()));
        }

        let magic = le16(data, 0x38);
        if magic != ext_params::MAGIC {
            return Err(Error::Unsupported(format!(
                "Not an ext2/ext3/ext4 filesystem (magic: 0x{:04X})",
                magic
            )));
        }

        let inodes_count = le32(data, 0x00);
        let blocks_count_lo = le32(data, 0x04);
        let first_data_block = le32(data, 0x14);
        let log_block_size = le32(data, 0x18);
        let blocks_per_group = le32(data, 0x20);
        let inodes_per_group = le32(data, 0x28);
        let rev_level = le32(data, 0x4C);
        let feature_incompat = le32(data, 0x60);
        let feature_ro_compat = le32(data, 0x64);

        if log_block_size > ext_params::MAX_LOG_BLOCK_SIZE {
            return Err(Error::DataCorruption(format!(
                "Invalid block size exponent: {}",
                log_block_size
            )));
        }
        let block_size = 1024u64 << log_block_size;

        let inode_size = if rev_level == 0 {
            ext_params::GOOD_OLD_INODE_SIZE
        } else {
            le16(data, 0x58)
        };
        if inode_size < ext_params::GOOD_OLD_INODE_SIZE || inode_size as u64 > block_size {
            return Err(Error::DataCorruption(format!(
                "Invalid inode size: {}",
                inode_size
            )));
        }
        if inodes_per_group == 0 || blocks_per_group == 0 {
            return Err(Error::DataCorruption(
                "Superblock reports empty block groups".to_string(),
            ));
        }
        // One inode bitmap block bounds a group's inodes
        if inodes_per_group as u64 > 8 * block_size {
            return Err(Error::DataCorruption(format!(
                "Invalid inodes per group: {}",
                inodes_per_group
            )));
        }

        let blocks_count_hi = if feature_incompat & INCOMPAT_64BIT != 0 {
            le32(data, 0x150)
        } else {
            0
        };
        let blocks_count = ((blocks_count_hi as u64) << 32) | (blocks_count_lo as u64);

        let inode_groups = inodes_count.div_ceil(inodes_per_group) as u64;
        if inode_groups > blocks_count.div_ceil(blocks_per_group as u64) {
            return Err(Error::DataCorruption(format!(
                "{} inode groups do not fit in {} blocks",
                inode_groups, blocks_count
            )));
        }

        let raw_desc_size = le16(data, 0xFE);
        let desc_size = if feature_incompat & INCOMPAT_64BIT != 0 && raw_desc_size >= 64 {
            raw_desc_size
        } else {
            32
        };

        Ok(Self {
            inodes_count,
            blocks_count,
            block_size,
            blocks_per_group,
            inodes_per_group,
            inode_size,
            first_data_block,
            desc_size,
            feature_incompat,
            feature_ro_compat,
        })
    }

    /// Number of block groups holding inodes.
    pub fn group_count(&self) -> u32 {
        self.inodes_count.div_ceil(self.inodes_per_group)
    }

    /// Whether group descriptors carry checksums and lazy-init hints.
    pub fn has_group_checksums(&self) -> bool {
        self.feature_ro_compat & (RO_COMPAT_GDT_CSUM | RO_COMPAT_METADATA_CSUM) != 0
    }

    fn is_64bit(&self) -> bool {
        self.feature_incompat & INCOMPAT_64BIT != 0
    }
}

/// Block group descriptor (fields the inode walk needs).
#[derive(Debug, Clone, Copy)]
pub struct GroupDesc {
    pub inode_table: u64,
    pub flags: u16,
    pub itable_unused: u32,
}

impl GroupDesc {
    fn parse(data: &[u8], is_64bit: bool) -> Self {
        let inode_table_lo = le32(data, 0x08);
        let flags = le16(data, 0x12);
        let itable_unused_lo = le16(data, 0x1C);

        let (inode_table_hi, itable_unused_hi) = if is_64bit && data.len() >= 64 {
            (le32(data, 0x28), le16(data, 0x32))
        } else {
            (0, 0)
        };

        Self {
            inode_table: ((inode_table_hi as u64) << 32) | (inode_table_lo as u64),
            flags,
            itable_unused: ((itable_unused_hi as u32) << 16) | (itable_unused_lo as u32),
        }
    }
}

/// Ext inode (key fields only).
#[derive(Debug, Clone)]
pub struct Ext4Inode {
    pub mode: u16,
    pub size: u64,
    pub links: u16,
    /// Raw `i_blocks`, including the high word when present.
    pub i_blocks: u64,
    pub flags: u32,
    /// The 60-byte `i_block` area: extent root or block map.
    pub block: [u8; 60],
}

impl Ext4Inode {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn uses_extents(&self) -> bool {
        self.flags & EXTENTS_FL != 0
    }

    pub fn has_inline_data(&self) -> bool {
        self.flags & INLINE_DATA_FL != 0
    }

    fn block_pointer(&self, index: usize) -> u64 {
        le32(&self.block, index * 4) as u64
    }
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: InodeId,
    pub name: String,
}

impl DirEntry {
    /// Whether this is the `.` or `..` entry.
    pub fn is_dot(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Parser for ext filesystems.
#[derive(Debug)]
pub struct Ext4Parser {
    device: BlockDevice,
    superblock: Ext4Superblock,
    groups: Vec<GroupDesc>,
}

impl Ext4Parser {
    /// Open the filesystem on `device_path` and read its group descriptors.
    pub fn open(device_path: &Path) -> Result<Self> {
        let device = BlockDevice::open(device_path)?;

        let sb_data = device.read_at(ext_params::SUPERBLOCK_OFFSET, ext_params::SUPERBLOCK_SIZE)?;
        let superblock = Ext4Superblock::parse(&sb_data)?;

        let count = superblock.group_count() as usize;
        let desc_size = superblock.desc_size as usize;
        let table_offset = (superblock.first_data_block as u64 + 1) * superblock.block_size;
        let table = device.read_at(table_offset, count * desc_size)?;
        let groups = table
            .chunks_exact(desc_size)
            .map(|chunk| GroupDesc::parse(chunk, superblock.is_64bit()))
            .collect();

        debug!(
            device = %device_path.display(),
            block_size = superblock.block_size,
            inodes = superblock.inodes_count,
            groups = count,
            "opened ext filesystem"
        );

        Ok(Self {
            device,
            superblock,
            groups,
        })
    }

    /// Get the block size of this filesystem.
    pub fn block_size(&self) -> u64 {
        self.superblock.block_size
    }

    pub fn superblock(&self) -> &Ext4Superblock {
        &self.superblock
    }

    pub fn device_path(&self) -> &Path {
        self.device.path()
    }

    /// Group descriptor by index.
    pub fn group(&self, group: u32) -> Result<GroupDesc> {
        self.groups.get(group as usize).copied().ok_or_else(|| {
            Error::DataCorruption(format!("Block group {} out of range", group))
        })
    }

    /// Number of leading inodes of `group` worth visiting.
    ///
    /// With group checksums, uninitialised groups hold no inodes and the
    /// tail counted by `itable_unused` was never written.
    pub fn scan_limit(&self, group: u32, desc: &GroupDesc) -> u32 {
        let sb = &self.superblock;
        let first_ino = group as u64 * sb.inodes_per_group as u64;
        let remaining = (sb.inodes_count as u64).saturating_sub(first_ino);
        let mut limit = (sb.inodes_per_group as u64).min(remaining) as u32;

        if sb.has_group_checksums() {
            if desc.flags & BG_INODE_UNINIT != 0 {
                return 0;
            }
            limit = limit.min(sb.inodes_per_group.saturating_sub(desc.itable_unused));
        }
        limit
    }

    /// Byte offset of a group's inode table, checked to hold `count` slots
    /// inside the filesystem.
    fn inode_table_offset(&self, desc: &GroupDesc, count: u64) -> Result<u64> {
        let sb = &self.superblock;
        let table_blocks = (count * sb.inode_size as u64).div_ceil(sb.block_size);

        desc.inode_table
            .checked_add(table_blocks)
            .filter(|&end| end <= sb.blocks_count)
            .and_then(|_| desc.inode_table.checked_mul(sb.block_size))
            .ok_or_else(|| {
                Error::DataCorruption(format!(
                    "Inode table at block {} lies outside the filesystem",
                    desc.inode_table
                ))
            })
    }

    /// Read the first `count` inode slots of a group's inode table.
    pub fn read_inode_table(&self, desc: &GroupDesc, count: u32) -> Result<Vec<u8>> {
        let offset = self.inode_table_offset(desc, count as u64)?;
        self.device
            .read_at(offset, count as usize * self.superblock.inode_size as usize)
    }

    /// Inode slot `index` of a buffer returned by `read_inode_table`.
    pub fn inode_in_table(&self, table: &[u8], index: u32) -> Result<Ext4Inode> {
        let size = self.superblock.inode_size as usize;
        let start = index as usize * size;
        let slot = table.get(start..start + size).ok_or_else(|| {
            Error::DataCorruption(format!("Inode slot {} outside inode table", index))
        })?;
        self.parse_inode(slot)
    }

    /// Read an inode by its number.
    pub fn read_inode(&self, ino: InodeId) -> Result<Ext4Inode> {
        if ino == 0 || ino > self.superblock.inodes_count as u64 {
            return Err(Error::NotFound(format!("inode {}", ino)));
        }

        let ipg = self.superblock.inodes_per_group as u64;
        let group = ((ino - 1) / ipg) as u32;
        let index = (ino - 1) % ipg;
        let desc = self.group(group)?;

        let offset = self.inode_table_offset(&desc, index + 1)?
            + index * self.superblock.inode_size as u64;
        let data = self
            .device
            .read_at(offset, self.superblock.inode_size as usize)?;
        self.parse_inode(&data)
    }

    /// Parse an inode from raw bytes.
    fn parse_inode(&self, data: &[u8]) -> Result<Ext4Inode> {
        if data.len() < ext_params::GOOD_OLD_INODE_SIZE as usize {
            return Err(Error::DataCorruption("Inode record too small".to_string()));
        }

        let mode = le16(data, 0x00);
        let size_lo = le32(data, 0x04);
        let links = le16(data, 0x1A);
        let blocks_lo = le32(data, 0x1C);
        let flags = le32(data, 0x20);
        let size_hi = le32(data, 0x6C);

        let blocks_hi = if self.superblock.feature_ro_compat & RO_COMPAT_HUGE_FILE != 0 {
            le16(data, 0x74)
        } else {
            0
        };

        let mut block = [0u8; 60];
        block.copy_from_slice(&data[0x28..0x28 + 60]);

        Ok(Ext4Inode {
            mode,
            size: ((size_hi as u64) << 32) | (size_lo as u64),
            links,
            i_blocks: ((blocks_hi as u64) << 32) | (blocks_lo as u64),
            flags,
            block,
        })
    }

    /// Allocated filesystem blocks of an inode, from `i_blocks`.
    ///
    /// `i_blocks` counts 512-byte sectors unless the inode is a huge file,
    /// in which case it already counts filesystem blocks.
    pub fn allocated_blocks(&self, inode: &Ext4Inode) -> u64 {
        let huge = self.superblock.feature_ro_compat & RO_COMPAT_HUGE_FILE != 0
            && inode.flags & HUGE_FILE_FL != 0;
        if huge {
            inode.i_blocks
        } else {
            (inode.i_blocks * SECTOR_SIZE).div_ceil(self.superblock.block_size)
        }
    }

    fn read_block(&self, block: u64) -> Result<Vec<u8>> {
        if block >= self.superblock.blocks_count {
            return Err(Error::DataCorruption(format!(
                "Block {} beyond end of filesystem",
                block
            )));
        }
        let size = self.superblock.block_size;
        let offset = block.checked_mul(size).ok_or_else(|| {
            Error::DataCorruption(format!("Block {} offset overflows", block))
        })?;
        self.device.read_at(offset, size as usize)
    }

    /// Physical data blocks of an inode in logical order, holes skipped.
    pub fn data_blocks(&self, inode: &Ext4Inode) -> Result<Vec<u64>> {
        let wanted = inode.size.div_ceil(self.superblock.block_size);
        if inode.uses_extents() {
            let mut runs = Vec::new();
            self.collect_extents(&inode.block, EXTENT_MAX_DEPTH, &mut runs)?;
            runs.sort_by_key(|&(logical, _, _)| logical);

            let mut blocks = Vec::new();
            for (logical, start, len) in runs {
                for i in 0..len as u64 {
                    if logical as u64 + i >= wanted {
                        break;
                    }
                    blocks.push(start + i);
                }
            }
            Ok(blocks)
        } else {
            self.collect_mapped_blocks(inode, wanted)
        }
    }

    /// Gather `(logical, physical, len)` runs from an extent node.
    fn collect_extents(
        &self,
        node: &[u8],
        depth_budget: u16,
        runs: &mut Vec<(u32, u64, u16)>,
    ) -> Result<()> {
        if node.len() < 12 || le16(node, 0) != EXTENT_MAGIC {
            return Err(Error::DataCorruption("Invalid extent header".to_string()));
        }
        let entries = le16(node, 2) as usize;
        let depth = le16(node, 6);
        if depth > depth_budget {
            return Err(Error::DataCorruption(format!(
                "Extent tree too deep: {}",
                depth
            )));
        }

        for i in 0..entries {
            let off = 12 + i * 12;
            if off + 12 > node.len() {
                warn!(entries, "extent node claims more entries than it holds");
                break;
            }
            if depth == 0 {
                let logical = le32(node, off);
                let raw_len = le16(node, off + 4);
                let start_hi = le16(node, off + 6) as u64;
                let start_lo = le32(node, off + 8) as u64;
                // Lengths above the init limit mark uninitialized extents
                let len = if raw_len > EXTENT_INIT_MAX_LEN {
                    raw_len - EXTENT_INIT_MAX_LEN
                } else {
                    raw_len
                };
                runs.push((logical, (start_hi << 32) | start_lo, len));
            } else {
                let leaf_lo = le32(node, off + 4) as u64;
                let leaf_hi = le16(node, off + 8) as u64;
                let child = self.read_block((leaf_hi << 32) | leaf_lo)?;
                self.collect_extents(&child, depth - 1, runs)?;
            }
        }
        Ok(())
    }

    /// Gather blocks from a direct/indirect block map, up to `wanted` blocks.
    fn collect_mapped_blocks(&self, inode: &Ext4Inode, wanted: u64) -> Result<Vec<u64>> {
        let mut blocks = Vec::new();
        for i in 0..NDIR_BLOCKS {
            let b = inode.block_pointer(i);
            if b != 0 {
                blocks.push(b);
            }
        }
        for (slot, level) in [(12usize, 1u32), (13, 2), (14, 3)] {
            if blocks.len() as u64 >= wanted {
                break;
            }
            let b = inode.block_pointer(slot);
            if b != 0 {
                self.collect_indirect(b, level, wanted, &mut blocks)?;
            }
        }
        blocks.truncate(wanted as usize);
        Ok(blocks)
    }

    fn collect_indirect(&self, block: u64, level: u32, wanted: u64, out: &mut Vec<u64>) -> Result<()> {
        let data = self.read_block(block)?;
        for chunk in data.chunks_exact(4) {
            if out.len() as u64 >= wanted {
                break;
            }
            let ptr = le32(chunk, 0) as u64;
            if ptr == 0 {
                continue;
            }
            if level == 1 {
                out.push(ptr);
            } else {
                self.collect_indirect(ptr, level - 1, wanted, out)?;
            }
        }
        Ok(())
    }

    /// Read every live entry of a directory.
    pub fn read_dir(&self, ino: InodeId) -> Result<Vec<DirEntry>> {
        let inode = self.read_inode(ino)?;
        if !inode.is_dir() {
            return Err(Error::NotFound(format!("inode {} is not a directory", ino)));
        }
        if inode.has_inline_data() {
            return Err(Error::Unsupported(format!(
                "inline directory data (inode {})",
                ino
            )));
        }

        let mut entries = Vec::new();
        for block in self.data_blocks(&inode)? {
            let data = self.read_block(block)?;
            self.parse_dir_block(&data, &mut entries)?;
        }
        Ok(entries)
    }

    fn parse_dir_block(&self, data: &[u8], entries: &mut Vec<DirEntry>) -> Result<()> {
        let has_filetype = self.superblock.feature_incompat & INCOMPAT_FILETYPE != 0;
        let mut off = 0usize;

        while off + 8 <= data.len() {
            let ino = le32(data, off) as u64;
            let mut rec_len = le16(data, off + 4) as usize;
            // 64 KiB blocks encode a full-block record as 0 or 65535
            if rec_len == 0 || rec_len == 65535 {
                rec_len = data.len() - off;
            }
            let name_len = if has_filetype {
                data[off + 6] as usize
            } else {
                le16(data, off + 6) as usize
            };

            if rec_len < 8 || off + rec_len > data.len() || 8 + name_len > rec_len {
                return Err(Error::DataCorruption(format!(
                    "Malformed directory entry at offset {}",
                    off
                )));
            }

            if ino != 0 && name_len > 0 {
                let name = String::from_utf8_lossy(&data[off + 8..off + 8 + name_len]).into_owned();
                entries.push(DirEntry { ino, name });
            }
            off += rec_len;
        }
        Ok(())
    }

    /// Absolute path of a directory, built by following `..` up to the root.
    pub fn dir_path(&self, dir: InodeId) -> Result<PathBuf> {
        let mut names = Vec::new();
        let mut current = dir;

        for _ in 0..ext_params::MAX_PATH_DEPTH {
            if current == ext_params::ROOT_INO {
                let mut path = PathBuf::from("/");
                path.extend(names.iter().rev());
                return Ok(path);
            }

            let entries = self.read_dir(current)?;
            let parent = entries
                .iter()
                .find(|e| e.name == "..")
                .map(|e| e.ino)
                .ok_or_else(|| {
                    Error::DataCorruption(format!("directory {} has no '..' entry", current))
                })?;
            if parent == current {
                return Err(Error::DataCorruption(format!(
                    "directory {} is its own parent",
                    current
                )));
            }

            let name = self
                .read_dir(parent)?
                .into_iter()
                .find(|e| e.ino == current && !e.is_dot())
                .map(|e| e.name)
                .ok_or_else(|| {
                    Error::DataCorruption(format!(
                        "directory {} is not listed in its parent {}",
                        current, parent
                    ))
                })?;

            names.push(name);
            current = parent;
        }

        Err(Error::DataCorruption(format!(
            "directory chain of inode {} exceeds {} levels",
            dir,
            ext_params::MAX_PATH_DEPTH
        )))
    }
}
