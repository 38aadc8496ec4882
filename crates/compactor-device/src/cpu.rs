//! CPU capability detection
//!
//! LZX is only worth its CPU cost on machines with enough cores. The class is
//! derived from core counts and then demoted one step when a short
//! single-thread benchmark shows a slow core.

use compactor_types::{CpuClass, CpuProfile, Error, Result};
use std::time::Instant;
use tracing::debug;

/// Physical cores needed for LZX by default
pub const MIN_PHYSICAL_CORES_FOR_LZX: usize = 3;
/// Logical cores needed for LZX by default
pub const MIN_LOGICAL_CORES_FOR_LZX: usize = 5;
/// Single-thread throughput below which the class is demoted
pub const MIN_THROUGHPUT_MBPS: f64 = 40.0;

const DEFAULT_SAMPLE_BYTES: usize = 8 * 1024 * 1024;

/// Classify a CPU from its core counts and measured throughput
pub fn classify(physical: usize, logical: usize, throughput_mbps: f64) -> CpuClass {
    let base = if physical >= MIN_PHYSICAL_CORES_FOR_LZX && logical >= MIN_LOGICAL_CORES_FOR_LZX {
        CpuClass::LzxCapableMultiCore
    } else if physical >= 2 {
        CpuClass::LzxCapableDualCore
    } else {
        CpuClass::BelowLzxThreshold
    };

    if throughput_mbps < MIN_THROUGHPUT_MBPS {
        demote(base)
    } else {
        base
    }
}

fn demote(class: CpuClass) -> CpuClass {
    match class {
        CpuClass::LzxCapableMultiCore => CpuClass::LzxCapableDualCore,
        CpuClass::LzxCapableDualCore | CpuClass::BelowLzxThreshold => CpuClass::BelowLzxThreshold,
    }
}

/// Measure single-thread throughput in MB/s with a byte-histogram kernel
///
/// The kernel is the same shape of work as entropy sampling, so it tracks how
/// fast this core chews through file data.
pub fn measure_throughput(sample_bytes: usize) -> f64 {
    let sample_bytes = sample_bytes.max(1);
    let buffer: Vec<u8> = (0..sample_bytes)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
        .collect();

    let start = Instant::now();
    let mut histogram = [0u64; 256];
    for &byte in &buffer {
        histogram[usize::from(byte)] += 1;
    }
    std::hint::black_box(&histogram);
    let elapsed = start.elapsed().as_secs_f64().max(1e-9);

    (sample_bytes as f64 / (1024.0 * 1024.0)) / elapsed
}

/// CPU probe
#[derive(Debug, Clone)]
pub struct CpuProbe {
    sample_bytes: usize,
}

impl CpuProbe {
    /// Create a probe with the default sample size
    pub fn new() -> Self {
        Self {
            sample_bytes: DEFAULT_SAMPLE_BYTES,
        }
    }

    /// Use a custom benchmark sample size
    pub fn with_sample_bytes(mut self, sample_bytes: usize) -> Self {
        self.sample_bytes = sample_bytes;
        self
    }

    /// Detect core counts and throughput
    pub async fn detect(&self) -> Result<CpuProfile> {
        let logical_cores = num_cpus::get().max(1);
        let physical_cores = num_cpus::get_physical().clamp(1, logical_cores);
        let sample_bytes = self.sample_bytes;

        let throughput_mbps = tokio::task::spawn_blocking(move || measure_throughput(sample_bytes))
            .await
            .map_err(|e| Error::device_detection(format!("CPU benchmark failed: {}", e)))?;

        let class = classify(physical_cores, logical_cores, throughput_mbps);
        debug!(
            "CPU: {} physical / {} logical cores, {:.0} MB/s single-thread, class {:?}",
            physical_cores, logical_cores, throughput_mbps, class
        );

        Ok(CpuProfile {
            physical_cores,
            logical_cores,
            throughput_mbps,
            class,
        })
    }
}

impl Default for CpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(4, 8, 500.0, CpuClass::LzxCapableMultiCore)]
    #[case(3, 5, 500.0, CpuClass::LzxCapableMultiCore)]
    #[case(3, 4, 500.0, CpuClass::LzxCapableDualCore)]
    #[case(2, 4, 500.0, CpuClass::LzxCapableDualCore)]
    #[case(1, 2, 500.0, CpuClass::BelowLzxThreshold)]
    #[case(8, 16, 10.0, CpuClass::LzxCapableDualCore)]
    #[case(2, 2, 10.0, CpuClass::BelowLzxThreshold)]
    #[case(1, 1, 10.0, CpuClass::BelowLzxThreshold)]
    fn test_classify(
        #[case] physical: usize,
        #[case] logical: usize,
        #[case] throughput: f64,
        #[case] expected: CpuClass,
    ) {
        assert_eq!(classify(physical, logical, throughput), expected);
    }

    #[test]
    fn test_measure_throughput_positive() {
        assert!(measure_throughput(64 * 1024) > 0.0);
    }

    #[tokio::test]
    async fn test_detect_reports_consistent_counts() {
        let profile = CpuProbe::new()
            .with_sample_bytes(256 * 1024)
            .detect()
            .await
            .unwrap();
        assert!(profile.physical_cores >= 1);
        assert!(profile.logical_cores >= profile.physical_cores);
        assert!(profile.throughput_mbps > 0.0);
    }
}
