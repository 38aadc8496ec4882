//! Unified test utilities for Compactor integration tests
//!
//! [`MemoryStore`] stands in for both the OS compression backend and the
//! attribute reader, so a run can be observed end to end without touching
//! NTFS. [`FakeVolume`] replaces volume inspection.

use async_trait::async_trait;
use compactor_config::Config;
use compactor_device::CapabilityProbe;
use compactor_engine::Pipeline;
use compactor_types::{
    AlgorithmChoice, AttributeReader, AttributeReading, CheckDepth, CompressionBackend,
    CompressionState, CpuClass, CpuProfile, DriveType, Error, Filesystem, Locality, PathStatus,
    Result, VolumeInspector, VolumeProfile,
};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tempfile::TempDir;

/// One backend invocation as seen by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Paths passed in
    pub paths: Vec<PathBuf>,
    /// Algorithm requested
    pub algorithm: AlgorithmChoice,
}

/// In-memory compression state shared by a backend and a reader
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<PathBuf, CompressionState>>,
    invocations: Mutex<Vec<Invocation>>,
    failing: Mutex<HashSet<PathBuf>>,
    leave_unmarked: bool,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    active_lzx: AtomicUsize,
    peak_lzx: AtomicUsize,
}

impl MemoryStore {
    /// Store where every applied path becomes compressed
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose backend reports success without marking anything
    pub fn leaving_unmarked() -> Self {
        Self {
            leave_unmarked: true,
            ..Self::default()
        }
    }

    /// Hold each invocation for `delay` so overlap can be observed
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Mark a path compressed before the run
    pub fn mark_compressed<P: Into<PathBuf>>(&self, path: P) {
        lock(&self.states).insert(path.into(), CompressionState::CompressedModern);
    }

    /// Make the backend report failure for a path
    pub fn fail_path<P: Into<PathBuf>>(&self, path: P) {
        lock(&self.failing).insert(path.into());
    }

    /// Current state of a path
    pub fn state(&self, path: &Path) -> CompressionState {
        lock(&self.states)
            .get(path)
            .copied()
            .unwrap_or(CompressionState::Uncompressed)
    }

    /// Every invocation so far, in call order
    pub fn invocations(&self) -> Vec<Invocation> {
        lock(&self.invocations).clone()
    }

    /// Every path handed to the backend, in call order
    pub fn applied_paths(&self) -> Vec<PathBuf> {
        lock(&self.invocations)
            .iter()
            .flat_map(|invocation| invocation.paths.iter().cloned())
            .collect()
    }

    /// Highest number of overlapping invocations seen
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping LZX invocations seen
    pub fn peak_lzx_concurrency(&self) -> usize {
        self.peak_lzx.load(Ordering::SeqCst)
    }
}

impl CompressionBackend for MemoryStore {
    fn apply(&self, paths: &[PathBuf], algorithm: AlgorithmChoice) -> Result<Vec<(PathBuf, PathStatus)>> {
        let lzx = algorithm == AlgorithmChoice::Lzx;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if lzx {
            let now = self.active_lzx.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_lzx.fetch_max(now, Ordering::SeqCst);
        }
        lock(&self.invocations).push(Invocation {
            paths: paths.to_vec(),
            algorithm,
        });

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let failing = lock(&self.failing).clone();
        let mut states = lock(&self.states);
        let statuses = paths
            .iter()
            .map(|path| {
                if failing.contains(path) {
                    return (path.clone(), PathStatus::Failed("Access is denied.".to_string()));
                }
                if !self.leave_unmarked {
                    states.insert(path.clone(), CompressionState::CompressedModern);
                }
                (path.clone(), PathStatus::Applied)
            })
            .collect();
        drop(states);

        if lzx {
            self.active_lzx.fetch_sub(1, Ordering::SeqCst);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(statuses)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl AttributeReader for MemoryStore {
    fn read_compression_state(&self, path: &Path, _depth: CheckDepth) -> Result<AttributeReading> {
        let len = fs::metadata(path)?.len();
        let state = self.state(path);
        let on_disk_size = if state.is_compressed() { len / 2 } else { len };
        Ok(AttributeReading {
            state,
            on_disk_size,
        })
    }
}

/// Volume inspector returning a fixed profile
#[derive(Debug, Clone)]
pub struct FakeVolume(pub VolumeProfile);

#[async_trait]
impl VolumeInspector for FakeVolume {
    async fn inspect(&self, _target: &Path) -> Result<VolumeProfile> {
        Ok(self.0.clone())
    }
}

/// Volume inspector that always fails
#[derive(Debug, Clone, Copy)]
pub struct UnreadableVolume;

#[async_trait]
impl VolumeInspector for UnreadableVolume {
    async fn inspect(&self, _target: &Path) -> Result<VolumeProfile> {
        Err(Error::device_detection("volume information unavailable"))
    }
}

/// Local NTFS volume rooted at `root`
pub fn ntfs_volume(root: &Path, drive_type: DriveType) -> VolumeProfile {
    VolumeProfile {
        root: root.to_path_buf(),
        drive_type,
        filesystem: Filesystem::Ntfs,
        locality: Locality::Local,
        rotational_hint_missing: drive_type == DriveType::Unknown,
    }
}

/// Network share rooted at `root`
pub fn remote_volume(root: &Path) -> VolumeProfile {
    VolumeProfile {
        locality: Locality::Remote,
        ..ntfs_volume(root, DriveType::Unknown)
    }
}

/// CPU profile of a given class with fixed core counts
pub fn cpu_profile(class: CpuClass, physical_cores: usize, logical_cores: usize) -> CpuProfile {
    CpuProfile {
        physical_cores,
        logical_cores,
        throughput_mbps: match class {
            CpuClass::BelowLzxThreshold => 150.0,
            CpuClass::LzxCapableDualCore | CpuClass::LzxCapableMultiCore => 900.0,
        },
        class,
    }
}

/// Eight-thread machine that may use LZX
pub fn multi_core_cpu() -> CpuProfile {
    cpu_profile(CpuClass::LzxCapableMultiCore, 4, 8)
}

/// Pipeline wired to a store, a fixed volume and a fixed CPU
pub fn pipeline_with(store: &Arc<MemoryStore>, volume: VolumeProfile, cpu: CpuProfile) -> Pipeline {
    pipeline_with_config(store, Arc::new(FakeVolume(volume)), cpu, Config::default())
}

/// Pipeline wired to a store and an arbitrary volume inspector
pub fn pipeline_with_inspector(
    store: &Arc<MemoryStore>,
    inspector: Arc<dyn VolumeInspector>,
    cpu: CpuProfile,
) -> Pipeline {
    pipeline_with_config(store, inspector, cpu, Config::default())
}

/// Pipeline with explicit configuration
pub fn pipeline_with_config(
    store: &Arc<MemoryStore>,
    inspector: Arc<dyn VolumeInspector>,
    cpu: CpuProfile,
    config: Config,
) -> Pipeline {
    let probe = CapabilityProbe::new()
        .with_inspector(inspector)
        .with_cpu_profile(cpu);
    Pipeline::new(config)
        .with_probe(probe)
        .with_reader(store.clone())
        .with_backend(store.clone())
}

/// Builds a directory tree of files with given sizes
///
/// Files are extended with `set_len`, so large sizes cost no disk space on
/// filesystems with sparse file support.
#[derive(Debug)]
pub struct TreeBuilder {
    dir: TempDir,
    files: Vec<PathBuf>,
}

impl TreeBuilder {
    /// Start an empty tree in a fresh temporary directory
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
            files: Vec::new(),
        })
    }

    /// Add a file of `size` bytes at `relative`
    pub fn file(mut self, relative: &str, size: u64) -> std::io::Result<Self> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(&path)?;
        file.set_len(size)?;
        self.files.push(path);
        Ok(self)
    }

    /// Add a file holding `contents` at `relative`
    pub fn file_with(mut self, relative: &str, contents: &[u8]) -> std::io::Result<Self> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        self.files.push(path);
        Ok(self)
    }

    /// Add `count` files of `size` bytes named `{prefix}{n}.{extension}`
    pub fn files(mut self, prefix: &str, extension: &str, count: usize, size: u64) -> std::io::Result<Self> {
        for n in 0..count {
            self = self.file(&format!("{prefix}{n:04}.{extension}"), size)?;
        }
        Ok(self)
    }

    /// Root of the tree
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a file added earlier
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Every file added, in insertion order
    pub fn paths(&self) -> &[PathBuf] {
        &self.files
    }
}

/// `len` bytes cycling through `symbols` distinct values
///
/// The entropy is exactly `log2(symbols)` bits per byte, so 256 symbols give
/// incompressible content and 16 give an estimated 50% saving.
pub fn cycling_bytes(symbols: u16, len: usize) -> Vec<u8> {
    (0..symbols.clamp(1, 256))
        .map(|b| b as u8)
        .cycle()
        .take(len)
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
