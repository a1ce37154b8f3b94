use crate::models::smart::DriveKind;
use std::io;
use thiserror::Error;

/// Failure status of a device query. Success is `Ok(_)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmartError {
    #[error("unspecified failure: {0}")]
    Error(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error on {path}: {detail}")]
    IoError { path: String, detail: String },

    #[error("out of memory")]
    NoMemory,

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("access denied to {0} (root/administrator privileges required)")]
    AccessDenied(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("no drives found")]
    NoDrivesFound,

    #[error("short read: expected {expected} bytes, got {actual}")]
    DataUnderflow { expected: usize, actual: usize },

    #[error("device reported an error on {path}: {detail}")]
    DeviceError { path: String, detail: String },

    #[error("wrong drive type: expected {expected}, device is {actual}")]
    WrongDriveType { expected: DriveKind, actual: DriveKind },
}

pub type SmartResult<T> = Result<T, SmartError>;

/// Numeric code reported for a successful call.
pub const SUCCESS_CODE: i32 = 0;

impl SmartError {
    /// Stable numeric status code, as carried in report metadata.
    pub fn code(&self) -> i32 {
        match self {
            SmartError::Error(_)               => -1,
            SmartError::InvalidParameter(_)    => -2,
            SmartError::IoError { .. }         => -3,
            SmartError::NoMemory               => -4,
            SmartError::DeviceNotFound(_)      => -5,
            SmartError::AccessDenied(_)        => -6,
            SmartError::Unsupported(_)         => -7,
            SmartError::BufferTooSmall { .. }  => -8,
            SmartError::NoDrivesFound          => -9,
            SmartError::DataUnderflow { .. }   => -10,
            SmartError::DeviceError { .. }     => -11,
            SmartError::WrongDriveType { .. }  => -12,
        }
    }

    /// Short symbolic name of the status.
    pub fn label(&self) -> &'static str {
        match self {
            SmartError::Error(_)               => "Error",
            SmartError::InvalidParameter(_)    => "InvalidParameter",
            SmartError::IoError { .. }         => "IoError",
            SmartError::NoMemory               => "NoMemory",
            SmartError::DeviceNotFound(_)      => "DeviceNotFound",
            SmartError::AccessDenied(_)        => "AccessDenied",
            SmartError::Unsupported(_)         => "Unsupported",
            SmartError::BufferTooSmall { .. }  => "BufferTooSmall",
            SmartError::NoDrivesFound          => "NoDrivesFound",
            SmartError::DataUnderflow { .. }   => "DataUnderflow",
            SmartError::DeviceError { .. }     => "DeviceError",
            SmartError::WrongDriveType { .. }  => "WrongDriveType",
        }
    }

    /// Map an OS-level error raised while talking to `path`.
    pub fn from_io(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound         => SmartError::DeviceNotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => SmartError::AccessDenied(path.to_string()),
            io::ErrorKind::OutOfMemory      => SmartError::NoMemory,
            io::ErrorKind::Unsupported      => SmartError::Unsupported(format!("{}: {}", path, err)),
            io::ErrorKind::UnexpectedEof    => SmartError::DataUnderflow { expected: 0, actual: 0 },
            _ => SmartError::IoError { path: path.to_string(), detail: err.to_string() },
        }
    }

    /// Whether re-running the whole query could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SmartError::IoError { .. } | SmartError::DeviceError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_statuses() {
        let e = SmartError::from_io("/dev/sda", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(e, SmartError::DeviceNotFound("/dev/sda".into()));

        let e = SmartError::from_io("/dev/sda", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(e.label(), "AccessDenied");

        let e = SmartError::from_io("/dev/sda", io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(e, SmartError::IoError { .. }));
        assert!(e.is_transient());
    }

    #[test]
    fn codes_are_distinct_and_negative() {
        let all = [
            SmartError::Error(String::new()),
            SmartError::InvalidParameter(String::new()),
            SmartError::IoError { path: String::new(), detail: String::new() },
            SmartError::NoMemory,
            SmartError::DeviceNotFound(String::new()),
            SmartError::AccessDenied(String::new()),
            SmartError::Unsupported(String::new()),
            SmartError::BufferTooSmall { needed: 0, available: 0 },
            SmartError::NoDrivesFound,
            SmartError::DataUnderflow { expected: 0, actual: 0 },
            SmartError::DeviceError { path: String::new(), detail: String::new() },
            SmartError::WrongDriveType { expected: DriveKind::Nvme, actual: DriveKind::Ata },
        ];
        let mut codes: Vec<i32> = all.iter().map(|e| e.code()).collect();
        assert!(codes.iter().all(|c| *c < SUCCESS_CODE));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn wrong_drive_type_message_names_both_kinds() {
        let e = SmartError::WrongDriveType { expected: DriveKind::Nvme, actual: DriveKind::Ata };
        assert_eq!(e.to_string(), "wrong drive type: expected NVMe, device is ATA");
    }
}
