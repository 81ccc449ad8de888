//! Running totals over the records of one scan target.

use crate::accounting::record::SlackRecord;
use serde::{Deserialize, Serialize};

/// Aggregate counts for one scan target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanTotals {
    /// Number of inodes folded in.
    pub inodes: u64,
    /// Sum of allocated blocks.
    pub blocks: u64,
    /// Sum of logical sizes.
    pub bytes: u64,
    /// Sum of slack bytes.
    pub slack: u64,
}

impl ScanTotals {
    /// Fold one record into the totals.
    pub fn add(&mut self, record: &SlackRecord) {
        self.inodes += 1;
        self.blocks = self.blocks.saturating_add(record.blocks);
        self.bytes = self.bytes.saturating_add(record.size);
        self.slack = self.slack.saturating_add(record.slack);
    }

    /// Combine two partial totals.
    pub fn merge(&mut self, other: &ScanTotals) {
        self.inodes += other.inodes;
        self.blocks = self.blocks.saturating_add(other.blocks);
        self.bytes = self.bytes.saturating_add(other.bytes);
        self.slack = self.slack.saturating_add(other.slack);
    }
}

impl<'a> Extend<&'a SlackRecord> for ScanTotals {
    fn extend<I: IntoIterator<Item = &'a SlackRecord>>(&mut self, iter: I) {
        for record in iter {
            self.add(record);
        }
    }
}

impl<'a> FromIterator<&'a SlackRecord> for ScanTotals {
    fn from_iter<I: IntoIterator<Item = &'a SlackRecord>>(iter: I) -> Self {
        let mut totals = ScanTotals::default();
        totals.extend(iter);
        totals
    }
}
