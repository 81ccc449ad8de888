//! Full-volume inode walk.

use crate::accounting::{ScanTotals, SlackRecord};
use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::scanner::context::ScanContext;
use crate::storage::FsDriver;
use std::iter::FusedIterator;
use std::path::Path;
use tracing::{debug, info};

/// Lifecycle of a volume walk once its volume is open.
///
/// Opening failures never produce a `VolumeScan`; `VolumeScanner::scan`
/// returns the error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// The cursor is live and more inodes may follow.
    Scanning,
    /// The terminator was reached and resources were released.
    Closed,
    /// The driver failed mid-walk and resources were released.
    Failed,
}

/// Starts volume walks with a given driver and configuration.
pub struct VolumeScanner<'a> {
    driver: &'a dyn FsDriver,
    resolve_paths: bool,
    skip_unlinked: bool,
}

impl<'a> VolumeScanner<'a> {
    pub fn new(driver: &'a dyn FsDriver, config: &ScanConfig) -> Self {
        Self {
            driver,
            resolve_paths: config.verbose,
            skip_unlinked: config.skip_unlinked,
        }
    }

    /// Open `device` and position a cursor before its first inode.
    pub fn scan(&self, device: &Path) -> Result<VolumeScan> {
        let mut ctx = ScanContext::open(self.driver, device)?;
        let block_size = ctx.block_size()?;

        if let Err(e) = ctx.begin_scan() {
            return Err(Error::open_failure(ctx.target(), e));
        }

        info!(
            device = %device.display(),
            driver = self.driver.name(),
            block_size,
            "scanning volume"
        );

        Ok(VolumeScan {
            ctx,
            state: ScanState::Scanning,
            totals: ScanTotals::default(),
            block_size,
            resolve_paths: self.resolve_paths,
            skip_unlinked: self.skip_unlinked,
        })
    }
}

/// An in-progress volume walk.
///
/// Yields one record per inode in enumeration order. Totals accumulate as
/// records are yielded and stay readable after a failure.
pub struct VolumeScan {
    ctx: ScanContext,
    state: ScanState,
    totals: ScanTotals,
    block_size: u64,
    resolve_paths: bool,
    skip_unlinked: bool,
}

impl VolumeScan {
    pub fn target(&self) -> &str {
        self.ctx.target()
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Totals over the records yielded so far.
    pub fn totals(&self) -> ScanTotals {
        self.totals
    }

    /// Whether the volume handle and cursor have been released.
    pub fn is_released(&self) -> bool {
        self.ctx.is_released()
    }

    /// Drain the walk without keeping records.
    pub fn finish(mut self) -> Result<ScanTotals> {
        for record in self.by_ref() {
            record?;
        }
        Ok(self.totals)
    }
}

impl Iterator for VolumeScan {
    type Item = Result<SlackRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != ScanState::Scanning {
            return None;
        }

        loop {
            let (ino, meta) = match self.ctx.next_inode() {
                Ok(Some(next)) => next,
                Ok(None) => {
                    self.state = ScanState::Closed;
                    self.ctx.release();
                    info!(
                        device = %self.ctx.target(),
                        inodes = self.totals.inodes,
                        slack = self.totals.slack,
                        "volume scan complete"
                    );
                    return None;
                }
                Err(e) => {
                    self.state = ScanState::Failed;
                    self.ctx.release();
                    return Some(Err(Error::scan_failure(self.ctx.target(), e)));
                }
            };

            if self.skip_unlinked && !meta.is_linked() {
                continue;
            }

            // A directory becomes the hint before its own record is built
            if meta.is_dir {
                self.ctx.enter_directory(ino);
            }

            let mut record = SlackRecord::new(ino, &meta, self.block_size);
            if self.resolve_paths {
                match self.ctx.resolve_path(ino) {
                    Ok(path) => record.path = Some(path),
                    Err(e) => debug!(ino, error = %e, "path not resolved"),
                }
            }

            self.totals.add(&record);
            return Some(Ok(record));
        }
    }
}

impl FusedIterator for VolumeScan {}
