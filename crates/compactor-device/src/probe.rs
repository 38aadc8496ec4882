//! Capability probe
//!
//! Runs once per run, before any file is looked at. Produces the immutable
//! [`Capabilities`] every later stage reads, or a fatal error when the target
//! cannot be compressed at all.

use crate::cpu::CpuProbe;
use crate::detector::PlatformVolumeInspector;
use compactor_types::{
    Capabilities, CpuProfile, Error, Filesystem, Locality, Result, VolumeInspector, VolumeProfile,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
enum CpuSource {
    Measure(CpuProbe),
    Fixed(CpuProfile),
}

/// Probes CPU and volume capabilities for a target
#[derive(Clone)]
pub struct CapabilityProbe {
    inspector: Arc<dyn VolumeInspector>,
    cpu: CpuSource,
}

impl std::fmt::Debug for CapabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityProbe")
            .field(
                "cpu",
                &match &self.cpu {
                    CpuSource::Measure(_) => "measured",
                    CpuSource::Fixed(_) => "fixed",
                },
            )
            .finish_non_exhaustive()
    }
}

impl CapabilityProbe {
    /// Probe using the host OS and a measured CPU profile
    pub fn new() -> Self {
        Self {
            inspector: Arc::new(PlatformVolumeInspector::new()),
            cpu: CpuSource::Measure(CpuProbe::new()),
        }
    }

    /// Replace the volume inspector
    pub fn with_inspector(mut self, inspector: Arc<dyn VolumeInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Use a known CPU profile instead of measuring
    pub fn with_cpu_profile(mut self, profile: CpuProfile) -> Self {
        self.cpu = CpuSource::Fixed(profile);
        self
    }

    /// Probe the target
    pub async fn probe(&self, target: &Path) -> Result<Capabilities> {
        let metadata = tokio::fs::metadata(target)
            .await
            .map_err(|e| target_error(target, &e))?;
        if !metadata.is_dir() {
            return Err(Error::config(format!(
                "{} is not a directory",
                target.display()
            )));
        }

        let volume = self.inspector.inspect(target).await.map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                Error::unsupported_volume(target, format!("volume could not be inspected: {}", e))
            }
        })?;
        validate_volume(target, &volume)?;

        if volume.rotational_hint_missing {
            info!(
                "Could not determine the drive type of {}, assuming non-rotational storage",
                volume.root.display()
            );
        }

        let cpu = match &self.cpu {
            CpuSource::Measure(probe) => probe.detect().await?,
            CpuSource::Fixed(profile) => profile.clone(),
        };

        info!(
            "Capabilities: {:?} CPU ({} physical / {} logical), {:?} drive, {} at {}",
            cpu.class,
            cpu.physical_cores,
            cpu.logical_cores,
            volume.drive_type,
            volume.filesystem,
            volume.root.display()
        );

        Ok(Capabilities { cpu, volume })
    }
}

impl Default for CapabilityProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn target_error(target: &Path, error: &std::io::Error) -> Error {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => Error::PermissionDenied {
            path: target.to_path_buf(),
        },
        _ => Error::TargetNotFound {
            path: target.to_path_buf(),
        },
    }
}

/// Reject volumes that cannot take transparent compression
pub fn validate_volume(target: &Path, volume: &VolumeProfile) -> Result<()> {
    if volume.locality == Locality::Remote {
        warn!("{} is on a network volume", target.display());
        return Err(Error::unsupported_volume(
            target,
            "network volumes are not supported",
        ));
    }

    if let Filesystem::Other(name) = &volume.filesystem {
        warn!("{} is on a {} volume", target.display(), name);
        return Err(Error::unsupported_volume(
            target,
            format!("filesystem {} does not support transparent compression", name),
        ));
    }

    debug!("Volume for {} accepted", target.display());
    Ok(())
}
