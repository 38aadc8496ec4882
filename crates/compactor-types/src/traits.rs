//! Core traits for Compactor operations
//!
//! These are the seams between the pipeline and the operating system: the
//! process that applies compression, the metadata query that reports a file's
//! state, and the volume inspection done before a run starts.

use crate::{AlgorithmChoice, AttributeReading, CheckDepth, PathStatus, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "async")]
use crate::VolumeProfile;
#[cfg(feature = "async")]
use async_trait::async_trait;

/// Applies OS-native compression to a batch of paths
///
/// Implementations block for the duration of the call; the engine runs them on
/// the blocking thread pool.
pub trait CompressionBackend: Send + Sync {
    /// Compress every path with one algorithm, returning a status per path
    ///
    /// An `Err` means the invocation itself failed and no per-path status is
    /// available.
    fn apply(&self, paths: &[PathBuf], algorithm: AlgorithmChoice) -> Result<Vec<(PathBuf, PathStatus)>>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Reads the compression state of a file
pub trait AttributeReader: Send + Sync {
    /// Read the state at the requested depth
    fn read_compression_state(&self, path: &Path, depth: CheckDepth) -> Result<AttributeReading>;
}

/// Inspects the volume that backs a path
#[cfg(feature = "async")]
#[async_trait]
pub trait VolumeInspector: Send + Sync {
    /// Describe the volume holding `target`
    async fn inspect(&self, target: &Path) -> Result<VolumeProfile>;
}
