//! Slack space accounting for block-based filesystems.
//!
//! Walks every inode of an ext2/ext3/ext4 volume (or reads a single file's
//! inode) and reports the unused tail bytes between each file's logical size
//! and the end of its last allocated block.
//!
//! # Architecture
//!
//! ```text
//! FsDriver → ScanContext → VolumeScan / FileScanner → SlackRecord → ScanTotals → Reporter
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use slackscan::scanner::VolumeScanner;
//! use slackscan::storage::ExtDriver;
//! use slackscan::ScanConfig;
//! use std::path::Path;
//!
//! let driver = ExtDriver;
//! let scanner = VolumeScanner::new(&driver, &ScanConfig::default());
//! let totals = scanner.scan(Path::new("/dev/sda1")).unwrap().finish().unwrap();
//! println!("{} slack bytes", totals.slack);
//! ```

pub mod accounting;
pub mod config;
pub mod error;
pub mod report;
pub mod scanner;
pub mod storage;

pub use accounting::{calc_slack, InodeId, InodeMetadata, ScanTotals, SlackRecord};
pub use config::{OutputFormat, ScanConfig};
pub use error::{Error, Result};
