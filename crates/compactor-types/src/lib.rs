//! Core type system and error handling for Compactor
//!
//! This crate provides the foundational types, error handling, and shared data structures
//! used throughout the Compactor workspace. It includes:
//!
//! - **Error handling**: Error types with severity levels and a fatal/per-file split
//! - **Core types**: File entries, classifications, outcomes, capabilities
//! - **Traits**: Seams for the compression backend, attribute reads and volume inspection
//! - **Configuration**: Validated newtypes for thresholds and counts
//!
//! # Features
//!
//! - `async`: Enable the async `VolumeInspector` trait
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use compactor_types::{AlgorithmChoice, FileEntry, FileOutcome, Result, RunResult};
//!
//! fn example_operation() -> Result<RunResult> {
//!     let entry = FileEntry::new("/data/app.log", 64 * 1024);
//!     let mut result = RunResult::new();
//!     result.record(FileOutcome::compressed(&entry, AlgorithmChoice::Xpress8K, Some(16 * 1024)));
//!     Ok(result)
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{BatchSize, SavingsThreshold, WorkerCount};
pub use error::{Error, ErrorKind, ErrorSeverity};
pub use result::Result;
pub use traits::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_creation() {
        let result = RunResult::new();
        assert!(result.is_empty());
        assert_eq!(result.space_saved(), 0);
        assert!(!result.all_failed());
    }

    #[test]
    fn test_run_result_merge() {
        let mut left = RunResult::new();
        let a = FileEntry::new("/t/a.txt", 100);
        let b = FileEntry::new("/t/b.txt", 200);
        left.record(FileOutcome::compressed(&a, AlgorithmChoice::Xpress4K, Some(50)));

        left.merge(vec![FileOutcome::compressed(
            &b,
            AlgorithmChoice::Xpress4K,
            Some(100),
        )]);
        assert_eq!(left.compressed(), 2);
        assert_eq!(left.space_saved(), 150);
        assert_eq!(left.bytes_processed(), 300);
    }

    #[test]
    fn test_error_severity() {
        let io_error = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        assert_eq!(io_error.severity(), ErrorSeverity::Medium);

        let config_error = Error::config("invalid config");
        assert_eq!(config_error.severity(), ErrorSeverity::High);
        assert!(config_error.is_fatal());
    }

    #[test]
    fn test_savings_threshold_validation() {
        assert!(SavingsThreshold::new(10).is_ok());
        assert!(SavingsThreshold::new(95).is_err());
    }
}
