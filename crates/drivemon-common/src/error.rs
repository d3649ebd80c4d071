//! Error types for Drivemon
//!
//! This module defines the common error type used throughout the system.
//! Nothing here is fatal to the exporter: every kind degrades to
//! "skip this device / this cycle / this observation" at the call site.

use thiserror::Error;

/// Common result type for Drivemon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Drivemon
#[derive(Debug, Error)]
pub enum Error {
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open device {path}: {source}")]
    DeviceOpen {
        path: String,
        source: std::io::Error,
    },

    #[error("{op} ioctl failed on {device}: {source}")]
    Ioctl {
        op: &'static str,
        device: String,
        source: nix::errno::Errno,
    },

    #[error("failed to close {device}: {source}")]
    Close {
        device: String,
        source: nix::errno::Errno,
    },

    #[error("device {0} speaks no supported SMART protocol")]
    UnsupportedDevice(String),

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a decode error
    pub fn decode(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            what,
            reason: reason.into(),
        }
    }

    /// Check if this error marks a device with no usable SMART protocol
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedDevice(_))
    }

    /// Check if this is a per-read failure (retry next cycle)
    #[must_use]
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Ioctl { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_unsupported() {
        assert!(Error::UnsupportedDevice("sdz".into()).is_unsupported());
        assert!(!Error::decode("x", "y").is_unsupported());
    }

    #[test]
    fn test_error_read_failure() {
        let err = Error::Ioctl {
            op: "smart read data",
            device: "/dev/sda".into(),
            source: nix::errno::Errno::EIO,
        };
        assert!(err.is_read_failure());
        assert!(!Error::UnsupportedDevice("sda".into()).is_read_failure());
    }

    #[test]
    fn test_error_display() {
        let err = Error::decode("nvme version", "tertiary byte set");
        assert_eq!(
            err.to_string(),
            "failed to decode nvme version: tertiary byte set"
        );
    }
}
