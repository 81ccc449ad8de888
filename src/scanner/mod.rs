//! Volume and single-file scanners.

mod context;
mod file;
mod volume;

pub use context::ScanContext;
pub use file::{estimate_from_status, FileScan, FileScanner};
pub use volume::{ScanState, VolumeScan, VolumeScanner};
