//! Error types and handling for Compactor
//!
//! Errors fall into two groups. Fatal errors (unsupported volume, protected
//! target, bad configuration) abort a run before any file is touched. Everything
//! else is scoped to a single file or batch and ends up recorded as an outcome
//! instead of being propagated.

use std::path::PathBuf;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Low severity - affects a single file or batch
    Low,
    /// Medium severity - affects a subtree or a probe result
    Medium,
    /// High severity - the run cannot start
    High,
    /// Critical severity - the target must never be processed
    Critical,
}

/// Main error type for Compactor operations
#[derive(thiserror::Error, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Target directory does not exist
    #[error("Target not found: {path}")]
    TargetNotFound {
        /// Path that was requested
        path: PathBuf,
    },

    /// Permission denied
    #[error("Permission denied: {path}")]
    PermissionDenied {
        /// Path with permission issues
        path: PathBuf,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// The volume backing the target cannot be compressed
    #[error("Unsupported volume for {path}: {reason}")]
    UnsupportedVolume {
        /// Target path
        path: PathBuf,
        /// Why the volume was rejected
        reason: String,
    },

    /// Target lies inside a protected system location
    #[error("Refusing to process protected path {path}: {reason}")]
    ProtectedPath {
        /// Target path
        path: PathBuf,
        /// Which protection rule matched
        reason: String,
    },

    /// Device detection error
    #[error("Device detection error: {message}")]
    DeviceDetection {
        /// Error message describing the device detection issue
        message: String,
    },

    /// Compression backend invocation failed
    #[error("Backend error: {message}")]
    Backend {
        /// Error message from the backend
        message: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O related errors
    Io,
    /// Configuration errors
    Config,
    /// Volume or target policy errors
    Volume,
    /// Device detection errors
    DeviceDetection,
    /// Backend errors
    Backend,
    /// Cancellation
    Cancelled,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::PermissionDenied { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Config,
            Self::TargetNotFound { .. }
            | Self::UnsupportedVolume { .. }
            | Self::ProtectedPath { .. } => ErrorKind::Volume,
            Self::DeviceDetection { .. } => ErrorKind::DeviceDetection,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Io { .. } => ErrorSeverity::Medium,
            Self::TargetNotFound { .. } | Self::PermissionDenied { .. } => ErrorSeverity::High,
            Self::Config { .. } => ErrorSeverity::High,
            Self::UnsupportedVolume { .. } | Self::ProtectedPath { .. } => ErrorSeverity::Critical,
            Self::DeviceDetection { .. } => ErrorSeverity::Medium,
            Self::Backend { .. } => ErrorSeverity::Low,
            Self::Cancelled => ErrorSeverity::Low,
            Self::Other { .. } => ErrorSeverity::Medium,
        }
    }

    /// Whether this error must stop the run before any file work happens
    pub fn is_fatal(&self) -> bool {
        self.severity() >= ErrorSeverity::High
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new unsupported volume error
    pub fn unsupported_volume<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::UnsupportedVolume {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new protected path error
    pub fn protected_path<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::ProtectedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new device detection error
    pub fn device_detection<S: Into<String>>(message: S) -> Self {
        Self::DeviceDetection {
            message: message.into(),
        }
    }

    /// Create a new backend error
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    proptest! {
        #[test]
        fn test_error_severity_consistency(message in ".*") {
            let errors = vec![
                Error::Io { message: message.clone() },
                Error::Config { message: message.clone() },
                Error::DeviceDetection { message: message.clone() },
                Error::Backend { message: message.clone() },
                Error::Other { message: message.clone() },
            ];

            for error in errors {
                let kind = error.kind();
                match error {
                    Error::Io { .. } => prop_assert_eq!(kind, ErrorKind::Io),
                    Error::Config { .. } => prop_assert_eq!(kind, ErrorKind::Config),
                    Error::DeviceDetection { .. } => prop_assert_eq!(kind, ErrorKind::DeviceDetection),
                    Error::Backend { .. } => prop_assert_eq!(kind, ErrorKind::Backend),
                    Error::Other { .. } => prop_assert_eq!(kind, ErrorKind::Other),
                    _ => {}
                }
            }
        }

        #[test]
        fn test_fatal_matches_severity(reason in ".*") {
            let error = Error::unsupported_volume("/mnt/share", reason);
            prop_assert!(error.is_fatal());
            prop_assert_eq!(error.severity(), ErrorSeverity::Critical);
        }
    }

    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Medium);
        assert!(ErrorSeverity::Medium < ErrorSeverity::High);
        assert!(ErrorSeverity::High < ErrorSeverity::Critical);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "test file");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert_eq!(error.severity(), ErrorSeverity::Medium);
        assert!(!error.is_fatal());
        assert!(error.to_string().contains("test file"));
    }

    #[rstest]
    #[case(Error::config("bad"), true)]
    #[case(Error::TargetNotFound { path: PathBuf::from("/missing") }, true)]
    #[case(Error::protected_path("C:\\Windows", "system directory"), true)]
    #[case(Error::backend("compact exited with 1"), false)]
    #[case(Error::Cancelled, false)]
    #[case(Error::device_detection("no mounts"), false)]
    fn test_fatal_classification(#[case] error: Error, #[case] fatal: bool) {
        assert_eq!(error.is_fatal(), fatal);
    }

    #[test]
    fn test_volume_error_message() {
        let error = Error::unsupported_volume("/mnt/share", "remote volume");
        assert_eq!(error.kind(), ErrorKind::Volume);
        assert_eq!(
            error.to_string(),
            "Unsupported volume for /mnt/share: remote volume"
        );
    }
}
