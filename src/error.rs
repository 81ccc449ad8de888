//! Error types for slack scanning.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for slack scanning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening, walking or reporting on a volume.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during device or file access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Volume, file or inode does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Insufficient privileges to read the device.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Filesystem format or feature the driver cannot read.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// On-disk structures are inconsistent.
    #[error("Data corruption: {0}")]
    DataCorruption(String),

    /// A volume or file could not be opened. Fatal for that target.
    #[error("Error opening '{target}': {source}")]
    OpenFailure {
        target: String,
        #[source]
        source: Box<Error>,
    },

    /// The driver failed in the middle of an inode walk. Fatal for that scan.
    #[error("Error scanning '{target}': {source}")]
    ScanFailure {
        target: String,
        #[source]
        source: Box<Error>,
    },

    /// An inode could not be mapped to a path. Never fatal.
    #[error("Cannot resolve path of inode {ino}: {reason}")]
    PathResolution { ino: u64, reason: String },

    /// The block device holding a file could not be determined.
    #[error("Cannot resolve device for {path}: {reason}")]
    DeviceResolution { path: PathBuf, reason: String },

    /// Configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Wrap a driver error as the open failure of `target`.
    pub fn open_failure(target: impl Into<String>, source: Error) -> Self {
        Error::OpenFailure {
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a driver error as the scan failure of `target`.
    pub fn scan_failure(target: impl Into<String>, source: Error) -> Self {
        Error::ScanFailure {
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Classify an I/O error raised while opening `path`.
    pub fn from_open_io(path: &std::path::Path, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(format!(
                "Cannot open {}. Try running with sudo.",
                path.display()
            )),
            _ => Error::Io(e),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
