//! Content sampling
//!
//! Shannon entropy over a few spaced windows of a file estimates how much NTFS
//! compression could save without reading the whole file.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Size of one sampling window
pub const SAMPLE_WINDOW: usize = 16 * 1024;

/// Entropy of a byte slice in bits per byte
pub fn shannon_entropy(data: &[u8]) -> f64 {
    let mut histogram = [0u64; 256];
    for &byte in data {
        histogram[usize::from(byte)] += 1;
    }
    entropy_from_histogram(&histogram, data.len() as u64)
}

fn entropy_from_histogram(histogram: &[u64; 256], total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let probability = count as f64 / total;
            -probability * probability.log2()
        })
        .sum()
}

/// Estimated savings in percent for an entropy in bits per byte
pub fn savings_from_entropy(bits_per_byte: f64) -> f64 {
    ((1.0 - bits_per_byte / 8.0) * 100.0).clamp(0.0, 100.0)
}

/// Window offsets for a file of `size` bytes
///
/// Files up to four windows long are read back to back. Larger files are read
/// at the start, one third, two thirds and the tail, dropping any middle
/// window that would overlap its neighbours. Windows never overlap.
pub fn window_offsets(size: u64) -> Vec<u64> {
    let window = SAMPLE_WINDOW as u64;
    if size <= 4 * window {
        return (0..size.max(1)).step_by(SAMPLE_WINDOW).collect();
    }

    let last = size - window;
    let mut offsets = vec![0];
    for candidate in [size / 3, size / 3 * 2] {
        let previous = offsets.last().copied().unwrap_or(0);
        if candidate >= previous + window && candidate + window <= last {
            offsets.push(candidate);
        }
    }
    offsets.push(last);
    offsets
}

/// Result of sampling one file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropySample {
    /// Entropy across all windows, in bits per byte
    pub bits_per_byte: f64,
    /// Bytes read
    pub bytes_sampled: u64,
}

impl EntropySample {
    /// Estimated savings in percent
    pub fn estimated_savings(&self) -> f64 {
        savings_from_entropy(self.bits_per_byte)
    }
}

/// Sample up to four spaced windows of a file
pub fn sample_file(path: &Path) -> io::Result<EntropySample> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut histogram = [0u64; 256];
    let mut buffer = vec![0u8; SAMPLE_WINDOW];
    let mut bytes_sampled = 0u64;

    for offset in window_offsets(size) {
        file.seek(SeekFrom::Start(offset))?;
        let read = read_window(&mut file, &mut buffer)?;
        for &byte in &buffer[..read] {
            histogram[usize::from(byte)] += 1;
        }
        bytes_sampled += read as u64;
    }

    let bits_per_byte = entropy_from_histogram(&histogram, bytes_sampled);
    debug!(
        "Sampled {} bytes of {}: {:.2} bits/byte",
        bytes_sampled,
        path.display(),
        bits_per_byte
    );
    Ok(EntropySample {
        bits_per_byte,
        bytes_sampled,
    })
}

fn read_window(file: &mut File, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Limits for sampling a directory tree
#[derive(Debug, Clone, Copy)]
pub struct DirectorySampleLimits {
    /// Maximum files to read
    pub max_files: usize,
    /// Bytes read from the head of each file
    pub chunk_size: usize,
    /// Maximum bytes to read overall
    pub max_bytes: u64,
}

impl DirectorySampleLimits {
    /// Light sampling used to annotate cache directories
    pub const ANNOTATE: Self = Self {
        max_files: 24,
        chunk_size: 64 * 1024,
        max_bytes: 4 * 1024 * 1024,
    };

    /// Heavier sampling used to decide whether a directory is worth entering
    pub const PRUNE: Self = Self {
        max_files: 48,
        chunk_size: 64 * 1024,
        max_bytes: 8 * 1024 * 1024,
    };
}

/// Result of sampling a directory tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectorySample {
    /// Size-weighted mean entropy in bits per byte
    pub average_entropy: f64,
    /// Files read
    pub sampled_files: usize,
    /// Bytes read
    pub sampled_bytes: u64,
}

impl DirectorySample {
    /// Estimated savings in percent
    pub fn estimated_savings(&self) -> f64 {
        savings_from_entropy(self.average_entropy)
    }
}

/// Breadth-first sample of file heads below `root`
///
/// Unreadable entries are skipped. Returns `None` when nothing could be read.
pub fn sample_directory(root: &Path, limits: DirectorySampleLimits) -> Option<DirectorySample> {
    let mut pending = VecDeque::from([root.to_path_buf()]);
    let mut buffer = vec![0u8; limits.chunk_size.max(1)];
    let mut sampled_files = 0usize;
    let mut sampled_bytes = 0u64;
    let mut weighted_entropy = 0.0;

    'walk: while let Some(current) = pending.pop_front() {
        let mut children: Vec<_> = match std::fs::read_dir(&current) {
            Ok(entries) => entries.filter_map(Result::ok).collect(),
            Err(e) => {
                debug!("Unable to inspect {} for entropy: {}", current.display(), e);
                continue;
            }
        };
        children.sort_by_key(|entry| entry.file_name());

        for child in children {
            let Ok(file_type) = child.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push_back(child.path());
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let read = File::open(child.path()).and_then(|mut file| read_window(&mut file, &mut buffer));
            let length = match read {
                Ok(0) => continue,
                Ok(length) => length,
                Err(e) => {
                    debug!("Unable to sample {}: {}", child.path().display(), e);
                    continue;
                }
            };

            weighted_entropy += shannon_entropy(&buffer[..length]) * length as f64;
            sampled_files += 1;
            sampled_bytes += length as u64;

            if sampled_files >= limits.max_files || sampled_bytes >= limits.max_bytes {
                break 'walk;
            }
        }
    }

    if sampled_bytes == 0 {
        return None;
    }

    Some(DirectorySample {
        average_entropy: weighted_entropy / sampled_bytes as f64,
        sampled_files,
        sampled_bytes,
    })
}
