//! Configuration types for Compactor
//!
//! Validated newtypes shared by the configuration layer, the engine and the CLI.

/// Minimum estimated savings, in percent, a file must reach to be compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SavingsThreshold(u8);

impl SavingsThreshold {
    /// Lowest accepted threshold
    pub const MIN: u8 = 0;
    /// Highest accepted threshold
    pub const MAX: u8 = 90;
    /// Default threshold
    pub const DEFAULT: u8 = 10;

    /// Create a new threshold with validation
    pub fn new(percent: u8) -> Result<Self, String> {
        if percent > Self::MAX {
            Err(format!(
                "Savings threshold {}% exceeds maximum {}%",
                percent,
                Self::MAX
            ))
        } else {
            Ok(Self(percent))
        }
    }

    /// Create a threshold, clamping out-of-range values
    pub fn clamped(percent: u8) -> Self {
        Self(percent.min(Self::MAX))
    }

    /// Get the threshold in percent
    pub fn get(self) -> u8 {
        self.0
    }

    /// Whether an estimate in percent falls below the threshold
    pub fn rejects(self, estimated_percent: f64) -> bool {
        estimated_percent < f64::from(self.0)
    }
}

impl Default for SavingsThreshold {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Worker count with validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerCount(usize);

impl WorkerCount {
    /// Minimum worker count
    pub const MIN: usize = 1;
    /// Maximum worker count
    pub const MAX: usize = 256;

    /// Create a new worker count with validation
    pub fn new(count: usize) -> Result<Self, String> {
        if count < Self::MIN {
            Err(format!("Worker count {} is below minimum {}", count, Self::MIN))
        } else if count > Self::MAX {
            Err(format!("Worker count {} exceeds maximum {}", count, Self::MAX))
        } else {
            Ok(Self(count))
        }
    }

    /// Get the worker count value
    pub fn get(self) -> usize {
        self.0
    }
}

/// Number of files handed to one backend invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchSize(usize);

impl BatchSize {
    /// Minimum batch size
    pub const MIN: usize = 1;
    /// Maximum batch size
    pub const MAX: usize = 10_000;
    /// Default batch size
    pub const DEFAULT: usize = 100;

    /// Create a new batch size with validation
    pub fn new(size: usize) -> Result<Self, String> {
        if size < Self::MIN {
            Err(format!("Batch size {} is below minimum {}", size, Self::MIN))
        } else if size > Self::MAX {
            Err(format!("Batch size {} exceeds maximum {}", size, Self::MAX))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the batch size value
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}
