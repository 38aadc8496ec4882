//! Directory scanner
//!
//! Walks the target in a deterministic order and produces one [`FileEntry`]
//! per regular file. Protected system directories and application caches are
//! pruned before they are entered; symlinks are never followed.

use crate::entropy::{sample_directory, DirectorySampleLimits};
use compactor_types::{Error, FileEntry, Result, SavingsThreshold};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Volume-relative directories that are never compressed
const PROTECTED_DIRECTORIES: &[&[&str]] = &[
    &["windows"],
    &["program files", "windowsapps"],
    &["program files (x86)", "windowsapps"],
    &["system volume information"],
    &["$recycle.bin"],
    &["recovery"],
];

const CACHE_TERMINALS: &[&str] = &[
    "cache",
    "cache2",
    "cache_data",
    "cachedata",
    "media cache",
    "code cache",
    "gpu cache",
    "cache storage",
    "cache_storage",
    "shadercache",
];

const CACHE_ROOT_MARKERS: &[&str] = &[
    "appdata",
    "programdata",
    "locallow",
    "localcache",
    "localappdata",
    "users",
    "temp",
];

const CACHE_APP_HINTS: &[&str] = &[
    "chrome",
    "chromium",
    "brave",
    "edge",
    "electron",
    "discord",
    "teams",
    "steam",
    "telegram",
    "whatsapp",
    "slack",
    "vivaldi",
    "opera",
    "githubdesktop",
    "riot",
    "epic",
    "zoom",
    "spotify",
    "firefox",
    "mozilla",
];

/// Why a directory was pruned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DirectorySkipCategory {
    /// Protected operating system directory
    System,
    /// Application cache
    Cache,
    /// Sampled content is too dense to be worth compressing
    HighEntropy,
}

/// A directory the scanner did not enter
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirectorySkip {
    /// Absolute path
    pub path: PathBuf,
    /// Path relative to the scan root
    pub relative_path: PathBuf,
    /// Human readable reason
    pub reason: String,
    /// Category
    pub category: DirectorySkipCategory,
    /// Mean entropy of sampled content, when sampled
    pub average_entropy: Option<f64>,
    /// Estimated savings of sampled content, when sampled
    pub estimated_savings: Option<f64>,
    /// Files read while sampling
    pub sampled_files: usize,
    /// Bytes read while sampling
    pub sampled_bytes: u64,
}

impl DirectorySkip {
    fn new(path: &Path, root: &Path, reason: String, category: DirectorySkipCategory) -> Self {
        Self {
            path: path.to_path_buf(),
            relative_path: path.strip_prefix(root).unwrap_or(path).to_path_buf(),
            reason,
            category,
            average_entropy: None,
            estimated_savings: None,
            sampled_files: 0,
            sampled_bytes: 0,
        }
    }
}

/// Everything a scan produced
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    /// Regular files in walk order
    pub entries: Vec<FileEntry>,
    /// Pruned directories
    pub excluded: Vec<DirectorySkip>,
    /// Entries that could not be read while walking
    pub walk_errors: usize,
}

impl ScanOutput {
    /// Total logical size of scanned files
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(FileEntry::size).sum()
    }
}

/// Scanner options
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Root of the volume, protected directories are matched relative to it
    pub volume_root: Option<PathBuf>,
    /// Sample pruned cache directories so the report can show their entropy
    pub sample_cache_entropy: bool,
    /// Prune directories whose sampled content falls below `min_savings`
    pub prune_high_entropy: bool,
    /// Threshold used by `prune_high_entropy`
    pub min_savings: SavingsThreshold,
}

/// Directory scanner
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    options: ScanOptions,
}

impl Scanner {
    /// Create a scanner
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Walk `root` and collect file entries
    pub fn scan(&self, root: &Path) -> Result<ScanOutput> {
        if let Some(reason) = protection_reason(root, self.options.volume_root.as_deref()) {
            return Err(Error::protected_path(
                root,
                format!(
                    "{}; use 'compact.exe /compactos:always' to compress Windows system files",
                    reason
                ),
            ));
        }

        let mut output = ScanOutput::default();
        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(next) = walker.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    output.walk_errors += 1;
                    continue;
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if let Some(skip) = self.evaluate_directory(entry.path(), root) {
                    debug!(
                        "Skipping {:?} directory {}: {}",
                        skip.category,
                        entry.path().display(),
                        skip.reason
                    );
                    output.excluded.push(skip);
                    walker.skip_current_dir();
                }
                continue;
            }

            if !file_type.is_file() {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => output
                    .entries
                    .push(FileEntry::new(entry.path(), metadata.len())),
                Err(e) => {
                    warn!("Cannot read metadata for {}: {}", entry.path().display(), e);
                    output.walk_errors += 1;
                }
            }
        }

        info!(
            "Scanned {} files under {} ({} directories excluded, {} unreadable entries)",
            output.entries.len(),
            root.display(),
            output.excluded.len(),
            output.walk_errors
        );
        Ok(output)
    }

    fn evaluate_directory(&self, directory: &Path, root: &Path) -> Option<DirectorySkip> {
        if let Some(reason) = protection_reason(directory, self.options.volume_root.as_deref()) {
            return Some(DirectorySkip::new(
                directory,
                root,
                reason,
                DirectorySkipCategory::System,
            ));
        }

        if let Some(reason) = cache_directory_reason(directory) {
            let mut skip = DirectorySkip::new(directory, root, reason, DirectorySkipCategory::Cache);
            if self.options.sample_cache_entropy {
                if let Some(sample) = sample_directory(directory, DirectorySampleLimits::ANNOTATE) {
                    skip.average_entropy = Some(sample.average_entropy);
                    skip.estimated_savings = Some(sample.estimated_savings());
                    skip.sampled_files = sample.sampled_files;
                    skip.sampled_bytes = sample.sampled_bytes;
                }
            }
            return Some(skip);
        }

        if self.options.prune_high_entropy {
            return self.evaluate_entropy(directory, root);
        }

        None
    }

    fn evaluate_entropy(&self, directory: &Path, root: &Path) -> Option<DirectorySkip> {
        let sample = sample_directory(directory, DirectorySampleLimits::PRUNE)?;
        if sample.sampled_bytes < 1024 {
            return None;
        }

        let savings = sample.estimated_savings();
        debug!(
            "Entropy sample for {}: {:.2} bits/byte (~{:.1}% savings) across {} files",
            directory.display(),
            sample.average_entropy,
            savings,
            sample.sampled_files
        );
        if !self.options.min_savings.rejects(savings) {
            return None;
        }

        let mut skip = DirectorySkip::new(
            directory,
            root,
            format!("High entropy (est. {:.1}% savings)", savings),
            DirectorySkipCategory::HighEntropy,
        );
        skip.average_entropy = Some(sample.average_entropy);
        skip.estimated_savings = Some(savings);
        skip.sampled_files = sample.sampled_files;
        skip.sampled_bytes = sample.sampled_bytes;
        Some(skip)
    }
}

fn lowered_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().to_lowercase()),
            _ => None,
        })
        .collect()
}

/// Reason a path is protected, if it is
///
/// Protected directories are matched on the components below the volume
/// root. Without a known volume root, the filesystem root is used.
pub fn protection_reason(path: &Path, volume_root: Option<&Path>) -> Option<String> {
    let relative = volume_root
        .and_then(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);
    let components = lowered_components(relative);

    PROTECTED_DIRECTORIES.iter().find_map(|protected| {
        if components.len() < protected.len()
            || !components.iter().zip(protected.iter()).all(|(a, b)| a == b)
        {
            return None;
        }
        let display = format!("{}{}", MAIN_SEPARATOR_STR, protected.join(MAIN_SEPARATOR_STR));
        if components.len() == protected.len() {
            Some(format!("Protected system directory ({})", display))
        } else {
            Some(format!("Within protected system directory ({})", display))
        }
    })
}

/// Reason a directory looks like an application cache, if it does
///
/// The last or second-to-last segment must contain a cache keyword and some
/// segment must be a per-user or per-machine data root. The reason names the
/// owning application when one is recognised.
pub fn cache_directory_reason(path: &Path) -> Option<String> {
    let parts: Vec<String> = path
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.len() <= 2 {
        return None;
    }
    let lowered: Vec<String> = parts.iter().map(|part| part.to_lowercase()).collect();

    let has_terminal = lowered[lowered.len() - 2..]
        .iter()
        .any(|segment| CACHE_TERMINALS.iter().any(|keyword| segment.contains(keyword)));
    if !has_terminal {
        return None;
    }

    if !lowered
        .iter()
        .any(|segment| CACHE_ROOT_MARKERS.contains(&segment.as_str()))
    {
        return None;
    }

    let descriptor = parts
        .iter()
        .zip(&lowered)
        .find(|(_, segment)| CACHE_APP_HINTS.iter().any(|hint| segment.contains(hint)))
        .map_or_else(|| parts[parts.len() - 1].as_str(), |(original, _)| original.as_str());

    Some(format!("{} cache directory", descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![b'a'; len]).unwrap();
    }

    #[rstest]
    #[case("/Windows", Some("Protected system directory"))]
    #[case("/Windows/System32/drivers", Some("Within protected system directory"))]
    #[case("/Program Files/WindowsApps/pkg", Some("Within protected system directory"))]
    #[case("/$Recycle.Bin", Some("Protected system directory"))]
    #[case("/Program Files/Tool", None)]
    #[case("/Users/me/Windows", None)]
    fn test_protection_reason(#[case] path: &str, #[case] expected: Option<&str>) {
        let reason = protection_reason(Path::new(path), None);
        match expected {
            Some(prefix) => assert!(reason.unwrap().starts_with(prefix)),
            None => assert!(reason.is_none()),
        }
    }

    #[test]
    fn test_protection_relative_to_volume_root() {
        let root = Path::new("/mnt/c");
        assert!(protection_reason(Path::new("/mnt/c/Windows/Temp"), Some(root)).is_some());
        assert!(protection_reason(Path::new("/mnt/c/Games"), Some(root)).is_none());
    }

    #[rstest]
    #[case(
        "/Users/me/AppData/Local/Google/Chrome/User Data/Default/Cache",
        Some("Chrome cache directory")
    )]
    #[case(
        "/Users/me/AppData/Roaming/discord/Code Cache/js",
        Some("discord cache directory")
    )]
    #[case("/Users/me/AppData/Local/Foo/GPUCache", Some("GPUCache cache directory"))]
    #[case("/srv/build/cache", None)]
    #[case("/Users/me/projects/src", None)]
    #[case("/cache", None)]
    fn test_cache_directory_reason(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(cache_directory_reason(Path::new(path)).as_deref(), expected);
    }

    #[test]
    fn test_scan_sorted_and_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("b.txt"), 10);
        touch(&root.join("a.txt"), 20);
        touch(&root.join("sub").join("c.log"), 30);
        touch(&root.join("Windows").join("System32").join("kernel.dll"), 40);
        touch(
            &root.join("Users").join("me").join("AppData").join("Steam").join("shadercache").join("x.bin"),
            50,
        );

        let scanner = Scanner::new(ScanOptions {
            volume_root: Some(root.to_path_buf()),
            ..ScanOptions::default()
        });
        let output = scanner.scan(root).unwrap();

        let names: Vec<_> = output
            .entries
            .iter()
            .map(|entry| entry.path().strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b.txt"),
                PathBuf::from("sub").join("c.log"),
            ]
        );
        assert_eq!(output.total_bytes(), 60);

        let categories: Vec<_> = output.excluded.iter().map(|skip| skip.category).collect();
        assert!(categories.contains(&DirectorySkipCategory::System));
        assert!(categories.contains(&DirectorySkipCategory::Cache));
        assert_eq!(output.walk_errors, 0);
    }

    #[test]
    fn test_scan_protected_target_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let windows = temp_dir.path().join("Windows");
        fs::create_dir_all(&windows).unwrap();

        let scanner = Scanner::new(ScanOptions {
            volume_root: Some(temp_dir.path().to_path_buf()),
            ..ScanOptions::default()
        });
        let err = scanner.scan(&windows).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("compactos"));
    }

    #[test]
    fn test_cache_sampling_annotates_skip() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("Users").join("me").join("AppData").join("Chrome").join("Cache").join("f_0001"), 4096);

        let scanner = Scanner::new(ScanOptions {
            sample_cache_entropy: true,
            ..ScanOptions::default()
        });
        let output = scanner.scan(root).unwrap();
        let skip = output
            .excluded
            .iter()
            .find(|skip| skip.category == DirectorySkipCategory::Cache)
            .unwrap();
        assert_eq!(skip.reason, "Chrome cache directory");
        assert_eq!(skip.sampled_files, 1);
        assert_eq!(skip.average_entropy, Some(0.0));
    }

    #[test]
    fn test_high_entropy_pruning() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let noise: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        fs::create_dir_all(root.join("media")).unwrap();
        fs::write(root.join("media").join("clip.dat"), &noise).unwrap();
        touch(&root.join("docs").join("readme.txt"), 4096);

        let scanner = Scanner::new(ScanOptions {
            prune_high_entropy: true,
            ..ScanOptions::default()
        });
        let output = scanner.scan(root).unwrap();

        assert_eq!(output.entries.len(), 1);
        assert!(output.entries[0].path().ends_with("readme.txt"));
        assert_eq!(output.excluded.len(), 1);
        assert_eq!(output.excluded[0].category, DirectorySkipCategory::HighEntropy);
        assert_eq!(output.excluded[0].relative_path, PathBuf::from("media"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        touch(&outside.path().join("secret.txt"), 10);
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("link")).unwrap();

        let output = Scanner::default().scan(temp_dir.path()).unwrap();
        assert!(output.entries.is_empty());
    }
}
