//! Storage layer: the driver interface the scanners consume, the ext
//! driver behind it, and block device discovery for single files.

mod device;
mod driver;
pub mod ext;

pub use device::{DeviceResolver, FileStatus, PartitionTable};
pub use driver::{FsDriver, InodeScan, Volume};
pub use ext::ExtDriver;
