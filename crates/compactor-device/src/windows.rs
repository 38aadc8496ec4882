//! Windows volume inspection
//!
//! Uses `GetVolumePathNameW` to find the volume root, `GetDriveTypeW` for
//! locality, `GetVolumeInformationW` for the filesystem name and the storage
//! seek-penalty property to tell rotational drives apart.

use compactor_types::{DriveType, Error, Filesystem, Locality, Result, VolumeProfile};
use std::ffi::OsStr;
use std::mem::size_of;
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;
use tracing::debug;
use winapi::shared::minwindef::{DWORD, FALSE, LPVOID, MAX_PATH};
use winapi::um::fileapi::{
    CreateFileW, GetDriveTypeW, GetVolumeInformationW, GetVolumePathNameW, OPEN_EXISTING,
};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::ioapiset::DeviceIoControl;
use winapi::um::winbase::DRIVE_REMOTE;
use winapi::um::winioctl::{
    PropertyStandardQuery, StorageDeviceSeekPenaltyProperty, DEVICE_SEEK_PENALTY_DESCRIPTOR,
    IOCTL_STORAGE_QUERY_PROPERTY, STORAGE_PROPERTY_QUERY,
};
use winapi::um::winnt::{FILE_SHARE_READ, FILE_SHARE_WRITE};

fn to_wide(value: &OsStr) -> Vec<u16> {
    value.encode_wide().chain(std::iter::once(0)).collect()
}

fn from_wide(buffer: &[u16]) -> String {
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..len])
}

/// Describe the volume holding `target`
pub fn inspect_volume(target: &Path) -> Result<VolumeProfile> {
    let root = volume_root(target)?;
    let root_wide = to_wide(root.as_os_str());

    let drive_type = unsafe { GetDriveTypeW(root_wide.as_ptr()) };
    let locality = if drive_type == DRIVE_REMOTE {
        Locality::Remote
    } else {
        Locality::Local
    };

    let filesystem = Filesystem::from_name(&filesystem_name(&root_wide)?);
    debug!(
        "Volume {} type {} filesystem {}",
        root.display(),
        drive_type,
        filesystem
    );

    let (drive_type, rotational_hint_missing) = if locality == Locality::Remote {
        (DriveType::Unknown, false)
    } else {
        match query_seek_penalty(&root) {
            Some(true) => (DriveType::Hdd, false),
            Some(false) => (DriveType::Ssd, false),
            None => (DriveType::Unknown, true),
        }
    };

    Ok(VolumeProfile {
        root,
        drive_type,
        filesystem,
        locality,
        rotational_hint_missing,
    })
}

/// Root of the volume that contains `target`
pub fn volume_root(target: &Path) -> Result<PathBuf> {
    let target_wide = to_wide(target.as_os_str());
    let mut buffer = vec![0u16; MAX_PATH + 1];

    let ok = unsafe {
        GetVolumePathNameW(
            target_wide.as_ptr(),
            buffer.as_mut_ptr(),
            buffer.len() as DWORD,
        )
    };
    if ok == FALSE {
        return Err(Error::device_detection(format!(
            "Cannot determine volume for {}: {}",
            target.display(),
            std::io::Error::last_os_error()
        )));
    }

    let root = from_wide(&buffer);
    let root = root.strip_prefix(r"\\?\").unwrap_or(&root).to_string();
    Ok(PathBuf::from(root))
}

fn filesystem_name(root_wide: &[u16]) -> Result<String> {
    let mut filesystem_name = vec![0u16; MAX_PATH + 1];
    let mut serial_number: DWORD = 0;
    let mut max_component_length: DWORD = 0;
    let mut filesystem_flags: DWORD = 0;

    let result = unsafe {
        GetVolumeInformationW(
            root_wide.as_ptr(),
            ptr::null_mut(),
            0,
            &mut serial_number,
            &mut max_component_length,
            &mut filesystem_flags,
            filesystem_name.as_mut_ptr(),
            filesystem_name.len() as DWORD,
        )
    };

    if result == FALSE {
        return Err(Error::device_detection(format!(
            "Failed to get volume information: {}",
            std::io::Error::last_os_error()
        )));
    }

    Ok(from_wide(&filesystem_name))
}

/// Ask the storage stack whether the disk behind a drive letter has a seek penalty
///
/// Returns `None` when the volume has no drive letter or the query is refused.
fn query_seek_penalty(root: &Path) -> Option<bool> {
    let root = root.to_string_lossy();
    let letter = root.trim_end_matches('\\');
    if letter.len() != 2 || !letter.ends_with(':') {
        debug!("No drive letter for {}, skipping seek penalty query", root);
        return None;
    }

    let device = format!(r"\\.\{}", letter);
    let device_wide = to_wide(OsStr::new(&device));
    let handle = unsafe {
        CreateFileW(
            device_wide.as_ptr(),
            0,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            ptr::null_mut(),
            OPEN_EXISTING,
            0,
            ptr::null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        debug!(
            "Cannot open {}: {}",
            device,
            std::io::Error::last_os_error()
        );
        return None;
    }

    let mut query: STORAGE_PROPERTY_QUERY = unsafe { std::mem::zeroed() };
    query.PropertyId = StorageDeviceSeekPenaltyProperty;
    query.QueryType = PropertyStandardQuery;
    let mut descriptor: DEVICE_SEEK_PENALTY_DESCRIPTOR = unsafe { std::mem::zeroed() };
    let mut returned: DWORD = 0;

    let ok = unsafe {
        DeviceIoControl(
            handle,
            IOCTL_STORAGE_QUERY_PROPERTY,
            &mut query as *mut STORAGE_PROPERTY_QUERY as LPVOID,
            size_of::<STORAGE_PROPERTY_QUERY>() as DWORD,
            &mut descriptor as *mut DEVICE_SEEK_PENALTY_DESCRIPTOR as LPVOID,
            size_of::<DEVICE_SEEK_PENALTY_DESCRIPTOR>() as DWORD,
            &mut returned,
            ptr::null_mut(),
        )
    };
    unsafe { CloseHandle(handle) };

    if ok == FALSE || (returned as usize) < size_of::<DEVICE_SEEK_PENALTY_DESCRIPTOR>() {
        debug!("Seek penalty query refused for {}", device);
        return None;
    }

    Some(descriptor.IncursSeekPenalty != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_root_of_current_dir() {
        let current_dir = std::env::current_dir().unwrap();
        let root = volume_root(&current_dir).unwrap();
        assert!(current_dir.starts_with(&root));
    }

    #[test]
    fn test_inspect_current_dir() {
        let current_dir = std::env::current_dir().unwrap();
        let profile = inspect_volume(&current_dir).unwrap();
        assert!(!profile.filesystem.to_string().is_empty());
    }
}
