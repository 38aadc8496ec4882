//! Unix volume inspection
//!
//! Mount information comes from `/proc/mounts` and rotational hints from
//! `/sys/block/<dev>/queue/rotational`. Volumes mounted through the `ntfs3`
//! or `ntfs-3g` drivers are recognised as NTFS. `ntfs-3g` mounts only show up
//! as `fuseblk`, so their boot sector is checked for the NTFS signature.

use compactor_types::{DriveType, Error, Filesystem, Locality, Result, VolumeProfile};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// OEM identifier at offset 3 of an NTFS boot sector
const NTFS_OEM_ID: &[u8] = b"NTFS    ";

/// One line of `/proc/mounts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Device name
    pub device: String,
    /// Mount point
    pub mount_point: PathBuf,
    /// Filesystem type
    pub fs_type: String,
}

/// Describe the volume holding `target`
pub async fn inspect_volume(target: &Path) -> Result<VolumeProfile> {
    let resolved = tokio::fs::canonicalize(target)
        .await
        .unwrap_or_else(|_| target.to_path_buf());

    let mounts = tokio::fs::read_to_string("/proc/mounts")
        .await
        .map_err(|e| Error::device_detection(format!("Failed to read /proc/mounts: {}", e)))?;

    let mount = find_mount(&mounts, &resolved)
        .ok_or_else(|| Error::device_detection("No mount point found for path"))?;
    debug!(
        "{} is on {} ({}) mounted at {}",
        resolved.display(),
        mount.device,
        mount.fs_type,
        mount.mount_point.display()
    );

    let locality = if is_network_filesystem(&mount.fs_type) {
        Locality::Remote
    } else {
        Locality::Local
    };

    let (drive_type, rotational_hint_missing) = match block_device_name(&mount.device) {
        Some(name) => read_rotational(&name).await,
        None => (DriveType::Unknown, true),
    };

    Ok(VolumeProfile {
        root: mount.mount_point.clone(),
        drive_type,
        filesystem: filesystem_of(&mount).await,
        locality,
        rotational_hint_missing,
    })
}

async fn filesystem_of(mount: &MountInfo) -> Filesystem {
    if mount.fs_type != "fuseblk" {
        return Filesystem::from_name(&mount.fs_type);
    }
    let sector = read_boot_sector(&mount.device).await;
    fuseblk_filesystem(sector.as_deref())
}

async fn read_boot_sector(device: &str) -> Option<Vec<u8>> {
    let mut file = match tokio::fs::File::open(device).await {
        Ok(file) => file,
        Err(e) => {
            debug!("Cannot read boot sector of {}: {}", device, e);
            return None;
        }
    };
    let mut sector = vec![0u8; 512];
    file.read_exact(&mut sector).await.ok()?;
    Some(sector)
}

/// Filesystem behind a `fuseblk` mount, given its boot sector if readable
///
/// An unreadable device is taken to be NTFS, since `ntfs-3g` is the usual
/// `fuseblk` driver.
pub fn fuseblk_filesystem(boot_sector: Option<&[u8]>) -> Filesystem {
    match boot_sector {
        Some(sector) if sector.get(3..11) == Some(NTFS_OEM_ID) => Filesystem::Ntfs,
        Some(_) => Filesystem::Other("fuseblk".to_string()),
        None => Filesystem::Ntfs,
    }
}

/// Find the longest mount point containing `path`
pub fn find_mount(mounts: &str, path: &Path) -> Option<MountInfo> {
    let mut best: Option<MountInfo> = None;
    let mut best_depth = 0;

    for line in mounts.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        let mount_point = PathBuf::from(unescape_mount_field(parts[1]));
        if !path.starts_with(&mount_point) {
            continue;
        }

        let depth = mount_point.components().count();
        if best.is_none() || depth >= best_depth {
            best_depth = depth;
            best = Some(MountInfo {
                device: parts[0].to_string(),
                mount_point,
                fs_type: parts[2].to_string(),
            });
        }
    }

    best
}

/// Decode the octal escapes `/proc/mounts` uses for whitespace
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b));
        if escaped {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            out.push(value as u8);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Check if a filesystem type is network-based
pub fn is_network_filesystem(fs_type: &str) -> bool {
    matches!(
        fs_type,
        "nfs"
            | "nfs4"
            | "cifs"
            | "smb"
            | "smb3"
            | "smbfs"
            | "ftp"
            | "sftp"
            | "sshfs"
            | "fuse.sshfs"
            | "davfs"
            | "ceph"
            | "9p"
            | "afs"
            | "glusterfs"
    )
}

/// Map a partition device to its whole-disk name under `/sys/block`
pub fn block_device_name(device: &str) -> Option<String> {
    let name = device.strip_prefix("/dev/")?;
    if name.is_empty() || name.contains('/') {
        return None;
    }

    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        if let Some(pos) = name.rfind('p') {
            let (disk, partition) = name.split_at(pos);
            let partition = &partition[1..];
            if !partition.is_empty()
                && partition.chars().all(|c| c.is_ascii_digit())
                && disk.ends_with(|c: char| c.is_ascii_digit())
            {
                return Some(disk.to_string());
            }
        }
        return Some(name.to_string());
    }

    let disk = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if disk.is_empty() {
        None
    } else {
        Some(disk.to_string())
    }
}

async fn read_rotational(device_name: &str) -> (DriveType, bool) {
    let rotational_path = format!("/sys/block/{}/queue/rotational", device_name);

    match tokio::fs::read_to_string(&rotational_path).await {
        Ok(content) => match content.trim() {
            "1" => {
                debug!("Device {} is rotational", device_name);
                (DriveType::Hdd, false)
            }
            "0" => {
                debug!("Device {} is non-rotational", device_name);
                (DriveType::Ssd, false)
            }
            other => {
                warn!("Unexpected rotational value {:?} for {}", other, device_name);
                (DriveType::Unknown, true)
            }
        },
        Err(e) => {
            debug!("No rotational hint for {}: {}", device_name, e);
            (DriveType::Unknown, true)
        }
    }
}
