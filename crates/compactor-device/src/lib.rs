//! CPU and volume capability probing for Compactor
//!
//! This crate answers two questions before a run starts:
//!
//! - **Can the target be compressed at all?** Remote shares and non-NTFS volumes are rejected.
//! - **How hard may the run push the machine?** The CPU class gates LZX and the
//!   drive type decides whether workers must be serialized.
//!
//! # Examples
//!
//! ```rust,no_run
//! use compactor_device::CapabilityProbe;
//! use std::path::Path;
//!
//! # tokio_test::block_on(async {
//! let capabilities = CapabilityProbe::new().probe(Path::new("D:\\projects")).await?;
//! println!("LZX by default: {}", capabilities.lzx_permitted(Default::default()));
//! # Ok::<(), compactor_types::Error>(())
//! # });
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cpu;
pub mod detector;
pub mod probe;

#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub mod unix;

// Re-export main types
pub use cpu::{classify, CpuProbe};
pub use detector::PlatformVolumeInspector;
pub use probe::{validate_volume, CapabilityProbe};
