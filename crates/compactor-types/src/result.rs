//! Result type alias for Compactor operations

use crate::Error;

/// Result type alias for Compactor operations
pub type Result<T> = std::result::Result<T, Error>;
