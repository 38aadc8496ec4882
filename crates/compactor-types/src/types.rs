//! Core data types for Compactor
//!
//! This module holds the data model shared by every stage of a run: the file
//! entries produced by the scanner, the per-file decisions of the classifier,
//! the host and volume capabilities, and the outcomes collected at the end.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Unique identifier for a run
pub type RunId = uuid::Uuid;

/// File size in bytes
pub type FileSize = u64;

/// Observed transparent-compression state of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CompressionState {
    /// Not read yet
    #[default]
    Unknown,
    /// Stored uncompressed
    Uncompressed,
    /// Carries the legacy NTFS compression attribute
    CompressedLegacy,
    /// Compressed through the modern overlay (XPRESS/LZX)
    CompressedModern,
}

impl CompressionState {
    /// Whether the file is compressed in either form
    pub fn is_compressed(self) -> bool {
        matches!(self, Self::CompressedLegacy | Self::CompressedModern)
    }
}

/// Algorithm family; each family has its own worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AlgorithmFamily {
    /// XPRESS4K, XPRESS8K and XPRESS16K
    Xpress,
    /// LZX
    Lzx,
}

impl fmt::Display for AlgorithmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xpress => write!(f, "XPRESS"),
            Self::Lzx => write!(f, "LZX"),
        }
    }
}

/// Compression algorithm chosen for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AlgorithmChoice {
    /// Leave the file alone
    None,
    /// XPRESS with 4 KiB chunks
    Xpress4K,
    /// XPRESS with 8 KiB chunks
    Xpress8K,
    /// XPRESS with 16 KiB chunks
    Xpress16K,
    /// LZX, best ratio and most CPU
    Lzx,
}

impl AlgorithmChoice {
    /// Order in which algorithm groups are planned
    pub const PLANNING_ORDER: [Self; 4] = [Self::Lzx, Self::Xpress16K, Self::Xpress8K, Self::Xpress4K];

    /// Family of this algorithm, `None` has no family
    pub fn family(self) -> Option<AlgorithmFamily> {
        match self {
            Self::None => None,
            Self::Xpress4K | Self::Xpress8K | Self::Xpress16K => Some(AlgorithmFamily::Xpress),
            Self::Lzx => Some(AlgorithmFamily::Lzx),
        }
    }

    /// Name understood by `compact.exe /exe:`
    pub fn compact_name(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Xpress4K => Some("XPRESS4K"),
            Self::Xpress8K => Some("XPRESS8K"),
            Self::Xpress16K => Some("XPRESS16K"),
            Self::Lzx => Some("LZX"),
        }
    }
}

impl fmt::Display for AlgorithmChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.compact_name().unwrap_or("NONE"))
    }
}

/// A regular file found under the target directory
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileEntry {
    path: PathBuf,
    size: FileSize,
    extension: String,
    /// Compression state, memoized by the classifier and corrected by the verifier
    pub state: CompressionState,
    /// Shannon entropy in bits per byte, only sampled when the extension is inconclusive
    pub entropy: Option<f64>,
    /// Allocated size reported by the attribute reader
    pub on_disk_size: Option<FileSize>,
}

impl FileEntry {
    /// Create an entry for a file of the given logical size
    pub fn new<P: Into<PathBuf>>(path: P, size: FileSize) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Self {
            path,
            size,
            extension,
            state: CompressionState::Unknown,
            entropy: None,
            on_disk_size: None,
        }
    }

    /// Absolute path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical size at scan time
    pub fn size(&self) -> FileSize {
        self.size
    }

    /// Lower-cased extension without the dot, empty when absent
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// Why a file was left alone
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SkipReason {
    /// Extension belongs to an already-compressed format
    PoorYieldExtension(String),
    /// Below the minimum size worth compressing
    TooSmall,
    /// Already compressed
    AlreadyCompressed,
    /// Sampled entropy predicts savings below the threshold (percent)
    LowEstimatedYield(f64),
    /// Metadata or contents could not be read
    Inaccessible(String),
    /// Lives under an excluded directory
    ExcludedDirectory(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoorYieldExtension(ext) => write!(f, "poor-yield extension .{}", ext),
            Self::TooSmall => write!(f, "too small"),
            Self::AlreadyCompressed => write!(f, "already compressed"),
            Self::LowEstimatedYield(percent) => {
                write!(f, "estimated savings {:.1}% below threshold", percent)
            }
            Self::Inaccessible(message) => write!(f, "inaccessible: {}", message),
            Self::ExcludedDirectory(reason) => write!(f, "excluded directory: {}", reason),
        }
    }
}

/// Why a file planned for compression did not end up compressed
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FailureReason {
    /// The backend reported an error for this path
    Backend(String),
    /// The backend reported success but the file is not compressed
    StillUnmarked,
    /// The verifier could not re-read the file
    Verification(String),
    /// The run was cancelled before the file's batch started
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(message) => write!(f, "backend: {}", message),
            Self::StillUnmarked => write!(f, "still unmarked after compression"),
            Self::Verification(message) => write!(f, "verification: {}", message),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Classifier verdict for one file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Classification {
    /// Compress with the given algorithm
    Compress(AlgorithmChoice),
    /// Leave the file alone
    Skip(SkipReason),
}

/// Final outcome of one file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Outcome {
    /// Compressed during this run
    Compressed,
    /// Found compressed before this run touched it
    AlreadyCompressed,
    /// Skipped by policy
    Skipped(SkipReason),
    /// Planned but not compressed
    Failed(FailureReason),
}

impl Outcome {
    /// Outcome for a classifier skip
    pub fn from_skip(reason: SkipReason) -> Self {
        match reason {
            SkipReason::AlreadyCompressed => Self::AlreadyCompressed,
            other => Self::Skipped(other),
        }
    }
}

/// Per-file record in the run result
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileOutcome {
    /// File path
    pub path: PathBuf,
    /// What happened
    pub outcome: Outcome,
    /// Logical size before the run
    pub bytes_before: FileSize,
    /// On-disk size after the run, when known
    pub bytes_after: Option<FileSize>,
    /// Algorithm applied or attempted
    pub algorithm: Option<AlgorithmChoice>,
}

impl FileOutcome {
    /// Outcome for a file the classifier skipped
    pub fn skipped(entry: &FileEntry, reason: SkipReason) -> Self {
        Self {
            path: entry.path().to_path_buf(),
            outcome: Outcome::from_skip(reason),
            bytes_before: entry.size(),
            bytes_after: entry.on_disk_size,
            algorithm: None,
        }
    }

    /// Outcome for a planned file that failed
    pub fn failed(entry: &FileEntry, algorithm: AlgorithmChoice, reason: FailureReason) -> Self {
        Self {
            path: entry.path().to_path_buf(),
            outcome: Outcome::Failed(reason),
            bytes_before: entry.size(),
            bytes_after: None,
            algorithm: Some(algorithm),
        }
    }

    /// Outcome for a file the backend compressed
    pub fn compressed(entry: &FileEntry, algorithm: AlgorithmChoice, bytes_after: Option<FileSize>) -> Self {
        Self {
            path: entry.path().to_path_buf(),
            outcome: Outcome::Compressed,
            bytes_before: entry.size(),
            bytes_after,
            algorithm: Some(algorithm),
        }
    }

    /// Bytes reclaimed by this run for this file
    pub fn space_saved(&self) -> FileSize {
        match (&self.outcome, self.bytes_after) {
            (Outcome::Compressed, Some(after)) => self.bytes_before.saturating_sub(after),
            _ => 0,
        }
    }
}

/// Outcomes of a run, keyed by path
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunResult {
    outcomes: BTreeMap<PathBuf, FileOutcome>,
}

impl RunResult {
    /// Create an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome, replacing any previous outcome for the same path
    pub fn record(&mut self, outcome: FileOutcome) {
        self.outcomes.insert(outcome.path.clone(), outcome);
    }

    /// Merge a worker's shard into this result
    pub fn merge<I: IntoIterator<Item = FileOutcome>>(&mut self, shard: I) {
        for outcome in shard {
            self.record(outcome);
        }
    }

    /// Outcome for a path
    pub fn get(&self, path: &Path) -> Option<&FileOutcome> {
        self.outcomes.get(path)
    }

    /// Iterate over outcomes in path order
    pub fn iter(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.values()
    }

    /// Mutable iteration over outcomes
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileOutcome> {
        self.outcomes.values_mut()
    }

    /// Number of files with an outcome
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether no file has an outcome
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| predicate(&o.outcome)).count()
    }

    /// Files compressed in this run
    pub fn compressed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Compressed))
    }

    /// Files that were already compressed
    pub fn already_compressed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::AlreadyCompressed))
    }

    /// Files skipped by policy
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    /// Files that failed
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    /// Files the backend claimed but left unmarked
    pub fn still_unmarked(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(FailureReason::StillUnmarked)))
    }

    /// Files left unprocessed because the run was cancelled
    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(FailureReason::Cancelled)))
    }

    /// Files that entered a batch (compressed or failed)
    pub fn attempted(&self) -> usize {
        self.compressed() + self.failed()
    }

    /// Whether files were attempted and every one of them failed
    ///
    /// Files drained by cancellation were never attempted and do not count.
    pub fn all_failed(&self) -> bool {
        self.failed() > self.cancelled() && self.compressed() == 0
    }

    /// Logical bytes of the files compressed in this run
    pub fn bytes_processed(&self) -> FileSize {
        self.outcomes
            .values()
            .filter(|o| matches!(o.outcome, Outcome::Compressed))
            .map(|o| o.bytes_before)
            .sum()
    }

    /// Total bytes reclaimed
    pub fn space_saved(&self) -> FileSize {
        self.outcomes.values().map(FileOutcome::space_saved).sum()
    }
}

/// Storage medium behind a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DriveType {
    /// No seek penalty
    Ssd,
    /// Rotational media
    Hdd,
    /// The OS gave no hint
    Unknown,
}

/// Filesystem of a volume
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Filesystem {
    /// NTFS, the only filesystem with transparent compression support
    Ntfs,
    /// Anything else, by name
    Other(String),
}

impl Filesystem {
    /// Classify a filesystem name as reported by the OS
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "ntfs" | "ntfs3" | "ntfs-3g" | "fuseblk.ntfs-3g" => Self::Ntfs,
            _ => Self::Other(name.trim().to_string()),
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ntfs => write!(f, "NTFS"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Whether a volume is attached locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Locality {
    /// Local disk
    Local,
    /// Network share
    Remote,
}

/// Characteristics of the volume backing the target
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeProfile {
    /// Volume root or mount point
    pub root: PathBuf,
    /// Storage medium
    pub drive_type: DriveType,
    /// Filesystem
    pub filesystem: Filesystem,
    /// Local or remote
    pub locality: Locality,
    /// The rotational hint was unavailable and non-rotational was assumed
    pub rotational_hint_missing: bool,
}

/// CPU capability class for LZX
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CpuClass {
    /// Too weak for LZX
    BelowLzxThreshold,
    /// LZX possible but only on explicit opt-in
    LzxCapableDualCore,
    /// LZX on by default
    LzxCapableMultiCore,
}

/// Host CPU characteristics
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CpuProfile {
    /// Physical cores
    pub physical_cores: usize,
    /// Logical cores
    pub logical_cores: usize,
    /// Single-thread throughput proxy in MB/s
    pub throughput_mbps: f64,
    /// Derived class
    pub class: CpuClass,
}

/// How LZX is gated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LzxPolicy {
    /// Follow the CPU class
    #[default]
    Auto,
    /// Always allow
    ForceOn,
    /// Never allow
    ForceOff,
}

/// Run-scoped capabilities, produced once by the probe
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capabilities {
    /// Host CPU
    pub cpu: CpuProfile,
    /// Target volume
    pub volume: VolumeProfile,
}

impl Capabilities {
    /// Whether LZX may be chosen under the given policy
    pub fn lzx_permitted(&self, policy: LzxPolicy) -> bool {
        match policy {
            LzxPolicy::ForceOff => false,
            LzxPolicy::ForceOn => true,
            LzxPolicy::Auto => self.cpu.class == CpuClass::LzxCapableMultiCore,
        }
    }

    /// Whether the volume calls for a single worker
    pub fn recommends_single_worker(&self) -> bool {
        self.volume.drive_type == DriveType::Hdd
    }
}

/// Operating mode of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OperationMode {
    /// Fast attribute checks, no verification
    #[default]
    Normal,
    /// Exact checks and verification
    Thorough,
    /// Legacy marking call plus exact checks and verification
    Branding,
}

impl OperationMode {
    /// Depth used for attribute reads during classification
    pub fn check_depth(self) -> CheckDepth {
        match self {
            Self::Normal => CheckDepth::Fast,
            Self::Thorough | Self::Branding => CheckDepth::Exact,
        }
    }

    /// Whether the verifier re-reads compressed files
    pub fn verifies(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Thorough => write!(f, "thorough"),
            Self::Branding => write!(f, "branding"),
        }
    }
}

/// Upper bound on workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WorkerCap {
    /// Derive from the CPU and volume
    #[default]
    Auto,
    /// Explicit cap
    Fixed(crate::WorkerCount),
    /// Exactly one worker
    SingleWorker,
}

/// How hard the attribute reader looks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CheckDepth {
    /// One metadata query; may miss some compressed files
    Fast,
    /// Authoritative check, may spawn a process
    Exact,
}

/// Result of an attribute read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttributeReading {
    /// Observed state
    pub state: CompressionState,
    /// Allocated bytes on disk
    pub on_disk_size: FileSize,
}

/// Backend status for one path of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PathStatus {
    /// The backend reports the path as processed
    Applied,
    /// The backend reports an error for the path
    Failed(String),
}

/// A decision taken because of a degraded capability
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PolicyDecision {
    /// Workers reduced to one because of rotational media
    SingleWorkerThrottle {
        /// Why the throttle applied
        reason: String,
    },
    /// LZX withheld
    LzxDisabled {
        /// Why LZX is off
        reason: String,
    },
    /// No rotational hint, non-rotational assumed
    RotationalHintMissing,
    /// An explicit worker count overrode the rotational-media safeguard
    WorkerOverrideOnHdd {
        /// Requested workers
        workers: usize,
    },
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleWorkerThrottle { reason } => {
                write!(f, "limited to a single worker: {}", reason)
            }
            Self::LzxDisabled { reason } => write!(f, "LZX disabled: {}", reason),
            Self::RotationalHintMissing => {
                write!(f, "drive type unknown, assuming non-rotational storage")
            }
            Self::WorkerOverrideOnHdd { workers } => write!(
                f,
                "running {} workers on rotational storage by explicit request",
                workers
            ),
        }
    }
}
