//! Worker pool sizing
//!
//! XPRESS and LZX batches run in separate pools. LZX is far more CPU hungry,
//! so its pool is never larger than the XPRESS pool, and every backend
//! invocation also needs a permit from a global cap.

use compactor_types::{AlgorithmFamily, Capabilities, WorkerCap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Worker counts for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolSizing {
    /// XPRESS pool workers
    pub xpress_workers: usize,
    /// LZX pool workers
    pub lzx_workers: usize,
    /// Backend invocations allowed at once across both pools
    pub global_cap: usize,
    /// Whether the single-worker safeguard is in effect
    pub single_worker: bool,
}

impl PoolSizing {
    /// Sizing that runs everything one batch at a time
    pub const SINGLE: Self = Self {
        xpress_workers: 1,
        lzx_workers: 1,
        global_cap: 1,
        single_worker: true,
    };

    /// Derive pool sizes from the host and the requested cap
    ///
    /// An explicit `Fixed` count bypasses the rotational-media safeguard.
    pub fn derive(capabilities: &Capabilities, cap: WorkerCap) -> Self {
        let xpress_default = capabilities.cpu.logical_cores.saturating_sub(1).max(1);
        let lzx_default = if capabilities.cpu.physical_cores <= 4 { 1 } else { 2 };

        match cap {
            WorkerCap::SingleWorker => Self::SINGLE,
            WorkerCap::Auto if capabilities.recommends_single_worker() => Self::SINGLE,
            WorkerCap::Auto => Self {
                xpress_workers: xpress_default,
                lzx_workers: lzx_default.min(xpress_default),
                global_cap: xpress_default,
                single_worker: false,
            },
            WorkerCap::Fixed(count) => {
                let requested = count.get();
                let xpress_workers = xpress_default.min(requested).max(1);
                Self {
                    xpress_workers,
                    lzx_workers: lzx_default.min(xpress_workers),
                    global_cap: requested,
                    single_worker: false,
                }
            }
        }
    }

    /// Workers for one family
    pub fn workers_for(&self, family: AlgorithmFamily) -> usize {
        match family {
            AlgorithmFamily::Xpress => self.xpress_workers,
            AlgorithmFamily::Lzx => self.lzx_workers,
        }
    }
}
