//! Slack accounting: the calculator, per-inode records and scan totals.

pub(crate) mod record;
mod slack;
mod totals;

pub use record::{InodeId, InodeMetadata, SlackRecord, SCAN_TERMINATOR};
pub use slack::calc_slack;
pub use totals::ScanTotals;
