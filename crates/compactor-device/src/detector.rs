//! Platform volume inspector
//!
//! Dispatches to the Windows or Unix implementation. Other platforms get an
//! unknown profile, which the probe rejects as unsupported.

use async_trait::async_trait;
use compactor_types::{Result, VolumeInspector, VolumeProfile};
use std::path::Path;
use tracing::debug;

/// Volume inspector backed by the host operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformVolumeInspector;

impl PlatformVolumeInspector {
    /// Create a new inspector
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VolumeInspector for PlatformVolumeInspector {
    async fn inspect(&self, target: &Path) -> Result<VolumeProfile> {
        debug!("Inspecting volume for path: {}", target.display());
        inspect_platform(target).await
    }
}

#[cfg(windows)]
async fn inspect_platform(target: &Path) -> Result<VolumeProfile> {
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || crate::windows::inspect_volume(&target))
        .await
        .map_err(|e| compactor_types::Error::device_detection(format!("Volume query panicked: {}", e)))?
}

#[cfg(unix)]
async fn inspect_platform(target: &Path) -> Result<VolumeProfile> {
    crate::unix::inspect_volume(target).await
}

#[cfg(not(any(windows, unix)))]
async fn inspect_platform(target: &Path) -> Result<VolumeProfile> {
    tracing::warn!("Volume inspection is not supported on this platform");
    Ok(VolumeProfile {
        root: target.to_path_buf(),
        drive_type: compactor_types::DriveType::Unknown,
        filesystem: compactor_types::Filesystem::Other("unknown".to_string()),
        locality: compactor_types::Locality::Local,
        rotational_hint_missing: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inspect_temp_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let inspector = PlatformVolumeInspector::new();

        // Containers may hide mount tables; only check shape when it works.
        if let Ok(profile) = inspector.inspect(temp_dir.path()).await {
            assert!(profile.root.is_absolute());
            if profile.drive_type == compactor_types::DriveType::Unknown {
                assert!(profile.rotational_hint_missing || profile.locality == compactor_types::Locality::Remote);
            }
        }
    }
}
