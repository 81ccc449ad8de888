//! Configuration constants and types for slack scanning.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kernel partition listing used to map device numbers to names.
pub const DEFAULT_PARTITION_TABLE: &str = "/proc/partitions";

/// Directory holding block device nodes.
pub const DEFAULT_DEVICE_DIR: &str = "/dev";

/// Size of the sectors `i_blocks` counts in.
pub const SECTOR_SIZE: u64 = 512;

/// On-disk constants of the ext2/ext3/ext4 family.
pub mod ext_params {
    /// Superblock magic number.
    pub const MAGIC: u16 = 0xEF53;

    /// Byte offset of the primary superblock.
    pub const SUPERBLOCK_OFFSET: u64 = 1024;

    /// Size of the superblock.
    pub const SUPERBLOCK_SIZE: usize = 1024;

    /// Inode number of the root directory.
    pub const ROOT_INO: u64 = 2;

    /// Inode size of revision 0 filesystems.
    pub const GOOD_OLD_INODE_SIZE: u16 = 128;

    /// Largest supported `s_log_block_size` (64 KiB blocks).
    pub const MAX_LOG_BLOCK_SIZE: u32 = 6;

    /// Deepest directory chain followed while building a path.
    pub const MAX_PATH_DEPTH: usize = 4096;
}

/// Output format of the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Configuration for a scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Emit one line per inode and resolve paths.
    pub verbose: bool,

    /// Leave inodes with a zero link count out of records and totals.
    pub skip_unlinked: bool,

    /// Report format.
    pub format: OutputFormat,

    /// Partition listing consulted for single-file scans.
    pub partition_table: PathBuf,

    /// Directory device names from the partition listing live in.
    pub device_dir: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            skip_unlinked: false,
            format: OutputFormat::Text,
            partition_table: PathBuf::from(DEFAULT_PARTITION_TABLE),
            device_dir: PathBuf::from(DEFAULT_DEVICE_DIR),
        }
    }
}

impl ScanConfig {
    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScanConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.partition_table.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "partition_table must not be empty".to_string(),
            ));
        }
        if self.device_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("device_dir must not be empty".to_string()));
        }
        Ok(())
    }
}
