//! Platform attribute reader
//!
//! On Windows a fast read looks at the legacy compression attribute and at the
//! allocated size reported by `GetCompressedFileSizeW`. WOF-compressed files
//! carry no attribute bit, and small files can report equal sizes, so an exact
//! read also asks `compact.exe /a` about the file.
//!
//! On Unix, allocated blocks stand in for the compressed size. This lets an
//! NTFS volume mounted through `ntfs3` report compressed files. Sparse files on
//! other filesystems also read as compressed.

use compactor_types::{AttributeReader, AttributeReading, CheckDepth, Result};
use std::path::Path;

/// Attribute reader backed by the host operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformAttributeReader;

impl PlatformAttributeReader {
    /// Create a new reader
    pub fn new() -> Self {
        Self
    }
}

impl AttributeReader for PlatformAttributeReader {
    fn read_compression_state(&self, path: &Path, depth: CheckDepth) -> Result<AttributeReading> {
        platform::read(path, depth)
    }
}

#[cfg(windows)]
mod platform {
    use compactor_types::{AttributeReading, CheckDepth, CompressionState, Error, Result};
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::os::windows::fs::MetadataExt;
    use std::os::windows::process::CommandExt;
    use std::path::Path;
    use std::process::Command;
    use tracing::debug;
    use winapi::shared::minwindef::DWORD;
    use winapi::shared::winerror::NO_ERROR;
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::fileapi::{GetCompressedFileSizeW, INVALID_FILE_SIZE};
    use winapi::um::winbase::CREATE_NO_WINDOW;
    use winapi::um::winnt::FILE_ATTRIBUTE_COMPRESSED;

    pub fn read(path: &Path, depth: CheckDepth) -> Result<AttributeReading> {
        let metadata = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
        let logical = metadata.len();
        let on_disk_size = compressed_size(path)?;

        let state = if metadata.file_attributes() & FILE_ATTRIBUTE_COMPRESSED != 0 {
            CompressionState::CompressedLegacy
        } else if on_disk_size < logical {
            CompressionState::CompressedModern
        } else if depth == CheckDepth::Exact && compact_reports_compressed(path) {
            CompressionState::CompressedModern
        } else {
            CompressionState::Uncompressed
        };

        Ok(AttributeReading {
            state,
            on_disk_size,
        })
    }

    fn compressed_size(path: &Path) -> Result<u64> {
        let wide: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let mut high: DWORD = 0;
        let low = unsafe { GetCompressedFileSizeW(wide.as_ptr(), &mut high) };
        if low == INVALID_FILE_SIZE {
            let code = unsafe { GetLastError() };
            if code != NO_ERROR {
                return Err(io_error(
                    path,
                    std::io::Error::from_raw_os_error(code as i32),
                ));
            }
        }
        Ok((u64::from(high) << 32) | u64::from(low))
    }

    /// Ask `compact.exe` whether a file is compressed
    fn compact_reports_compressed(path: &Path) -> bool {
        let output = Command::new("compact.exe")
            .arg("/a")
            .arg(path)
            .creation_flags(CREATE_NO_WINDOW)
            .output();
        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                stdout.contains("0 are not")
            }
            Err(e) => {
                debug!("compact.exe /a failed for {}: {}", path.display(), e);
                false
            }
        }
    }

    fn io_error(path: &Path, error: std::io::Error) -> Error {
        if error.kind() == std::io::ErrorKind::PermissionDenied {
            Error::PermissionDenied {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io {
                message: format!("{}: {}", path.display(), error),
            }
        }
    }
}

#[cfg(unix)]
mod platform {
    use compactor_types::{AttributeReading, CheckDepth, CompressionState, Error, Result};
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    pub fn read(path: &Path, _depth: CheckDepth) -> Result<AttributeReading> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                Error::PermissionDenied {
                    path: path.to_path_buf(),
                }
            } else {
                Error::Io {
                    message: format!("{}: {}", path.display(), e),
                }
            }
        })?;

        let logical = metadata.len();
        let on_disk_size = metadata.blocks().saturating_mul(512);
        let state = if logical > 0 && on_disk_size < logical {
            CompressionState::CompressedModern
        } else {
            CompressionState::Uncompressed
        };

        Ok(AttributeReading {
            state,
            on_disk_size,
        })
    }
}

#[cfg(not(any(windows, unix)))]
mod platform {
    use compactor_types::{AttributeReading, CheckDepth, Error, Result};
    use std::path::Path;

    pub fn read(path: &Path, _depth: CheckDepth) -> Result<AttributeReading> {
        Err(Error::backend(format!(
            "cannot read compression state of {} on this platform",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compactor_types::{CompressionState, Error};
    use tempfile::TempDir;

    #[test]
    fn test_plain_file_is_uncompressed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.txt");
        // Non-zero bytes so sparse handling cannot shrink the allocation
        std::fs::write(&path, vec![b'a'; 64 * 1024]).unwrap();

        let reading = PlatformAttributeReader::new()
            .read_compression_state(&path, CheckDepth::Fast)
            .unwrap();
        assert_eq!(reading.state, CompressionState::Uncompressed);
        assert!(reading.on_disk_size >= 64 * 1024);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = PlatformAttributeReader::new()
            .read_compression_state(Path::new("/no/such/file.bin"), CheckDepth::Fast)
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(err, Error::Io { .. } | Error::PermissionDenied { .. }));
    }
}
