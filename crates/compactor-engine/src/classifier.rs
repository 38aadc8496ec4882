//! File classifier
//!
//! Decides per file whether to compress and with which algorithm. Checks run
//! cheapest first and the first conclusive check wins:
//!
//! 1. poor-yield extension
//! 2. size below the minimum
//! 3. already compressed
//! 4. extension verdict, with content sampling when inconclusive
//! 5. size band picks the algorithm

use crate::entropy::sample_file;
use crate::extensions::{ExtensionTable, ExtensionVerdict};
use compactor_config::Config;
use compactor_types::{
    AlgorithmChoice, AttributeReader, Capabilities, Classification, FileEntry, FileSize, LzxPolicy,
    OperationMode, SavingsThreshold, SkipReason,
};
use std::sync::Arc;
use tracing::debug;

/// Upper bound of the XPRESS4K band
pub const XPRESS4K_LIMIT: FileSize = 64 * 1024;
/// Upper bound of the XPRESS8K band
pub const XPRESS8K_LIMIT: FileSize = 256 * 1024;

/// Outcome of the cheap checks
#[derive(Debug, Clone, PartialEq)]
pub enum Triage {
    /// Decided without reading content
    Definite(Classification),
    /// Content sampling decides
    NeedsSampling,
}

/// Classifier configuration
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Files below this size are skipped
    pub min_file_size: FileSize,
    /// Files at least this large may use LZX
    pub lzx_min_size: FileSize,
    /// Minimum estimated savings for sampled files
    pub min_savings: SavingsThreshold,
    /// Sample content when the extension is inconclusive
    pub entropy_sampling: bool,
    /// LZX policy for this run
    pub lzx_policy: LzxPolicy,
    /// Extensions to skip in addition to the built-in list
    pub extra_skip_extensions: Vec<String>,
}

impl ClassifierConfig {
    /// Create classifier config from main config
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_file_size: config.classifier.min_file_size,
            lzx_min_size: config.classifier.lzx_min_size,
            min_savings: config.run.savings_threshold(),
            entropy_sampling: config.run.entropy_sampling,
            lzx_policy: config.run.lzx_policy,
            extra_skip_extensions: config.classifier.extra_skip_extensions.clone(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// File classifier
#[derive(Clone)]
pub struct Classifier {
    config: ClassifierConfig,
    extensions: ExtensionTable,
    reader: Arc<dyn AttributeReader>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Classifier {
    /// Create a classifier reading compression state through `reader`
    pub fn new(config: ClassifierConfig, reader: Arc<dyn AttributeReader>) -> Self {
        let extensions = ExtensionTable::new().with_extra_skips(&config.extra_skip_extensions);
        Self {
            config,
            extensions,
            reader,
        }
    }

    /// Classifier configuration
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Algorithm for a file of `size` bytes
    pub fn select_algorithm(&self, size: FileSize, lzx_permitted: bool) -> AlgorithmChoice {
        if lzx_permitted && size >= self.config.lzx_min_size {
            AlgorithmChoice::Lzx
        } else if size < XPRESS4K_LIMIT {
            AlgorithmChoice::Xpress4K
        } else if size < XPRESS8K_LIMIT {
            AlgorithmChoice::Xpress8K
        } else {
            AlgorithmChoice::Xpress16K
        }
    }

    /// Run the checks that need no file content
    ///
    /// Records the compression state and on-disk size on the entry.
    pub fn triage(&self, entry: &mut FileEntry, mode: OperationMode, lzx_permitted: bool) -> Triage {
        let verdict = self.extensions.verdict(entry.extension());
        if verdict == ExtensionVerdict::PoorYield {
            return Triage::Definite(Classification::Skip(SkipReason::PoorYieldExtension(
                entry.extension().to_string(),
            )));
        }

        if entry.size() < self.config.min_file_size {
            return Triage::Definite(Classification::Skip(SkipReason::TooSmall));
        }

        match self
            .reader
            .read_compression_state(entry.path(), mode.check_depth())
        {
            Ok(reading) => {
                entry.state = reading.state;
                entry.on_disk_size = Some(reading.on_disk_size);
                if reading.state.is_compressed() {
                    return Triage::Definite(Classification::Skip(SkipReason::AlreadyCompressed));
                }
            }
            Err(e) => {
                return Triage::Definite(Classification::Skip(SkipReason::Inaccessible(
                    e.to_string(),
                )));
            }
        }

        if verdict == ExtensionVerdict::Inconclusive && self.config.entropy_sampling {
            return Triage::NeedsSampling;
        }

        Triage::Definite(Classification::Compress(
            self.select_algorithm(entry.size(), lzx_permitted),
        ))
    }

    /// Classify one file
    pub fn classify(
        &self,
        entry: &mut FileEntry,
        capabilities: &Capabilities,
        mode: OperationMode,
    ) -> Classification {
        let lzx_permitted = capabilities.lzx_permitted(self.config.lzx_policy);

        let classification = match self.triage(entry, mode, lzx_permitted) {
            Triage::Definite(classification) => classification,
            Triage::NeedsSampling => match sample_file(entry.path()) {
                Ok(sample) => {
                    entry.entropy = Some(sample.bits_per_byte);
                    let savings = sample.estimated_savings();
                    if self.config.min_savings.rejects(savings) {
                        Classification::Skip(SkipReason::LowEstimatedYield(savings))
                    } else {
                        Classification::Compress(self.select_algorithm(entry.size(), lzx_permitted))
                    }
                }
                Err(e) => Classification::Skip(SkipReason::Inaccessible(e.to_string())),
            },
        };

        match &classification {
            Classification::Compress(algorithm) => {
                debug!("{} -> {}", entry.path().display(), algorithm);
            }
            Classification::Skip(reason) => {
                debug!("Skipping {}: {}", entry.path().display(), reason);
            }
        }
        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compactor_types::{
        AttributeReading, CheckDepth, CompressionState, CpuClass, CpuProfile, DriveType, Error,
        Filesystem, Locality, Result, VolumeProfile,
    };
    use rstest::rstest;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct StubReader {
        compressed: HashSet<PathBuf>,
        broken: HashSet<PathBuf>,
        depths: Mutex<Vec<CheckDepth>>,
    }

    impl AttributeReader for StubReader {
        fn read_compression_state(&self, path: &Path, depth: CheckDepth) -> Result<AttributeReading> {
            self.depths.lock().unwrap().push(depth);
            if self.broken.contains(path) {
                return Err(Error::PermissionDenied {
                    path: path.to_path_buf(),
                });
            }
            let state = if self.compressed.contains(path) {
                CompressionState::CompressedModern
            } else {
                CompressionState::Uncompressed
            };
            Ok(AttributeReading {
                state,
                on_disk_size: 1,
            })
        }
    }

    fn capabilities(class: CpuClass) -> Capabilities {
        Capabilities {
            cpu: CpuProfile {
                physical_cores: 8,
                logical_cores: 16,
                throughput_mbps: 900.0,
                class,
            },
            volume: VolumeProfile {
                root: PathBuf::from("C:\\"),
                drive_type: DriveType::Ssd,
                filesystem: Filesystem::Ntfs,
                locality: Locality::Local,
                rotational_hint_missing: false,
            },
        }
    }

    fn classifier_with(reader: StubReader) -> Classifier {
        Classifier::new(ClassifierConfig::default(), Arc::new(reader))
    }

    #[rstest]
    #[case(8 * 1024, AlgorithmChoice::Xpress4K)]
    #[case(64 * 1024 - 1, AlgorithmChoice::Xpress4K)]
    #[case(64 * 1024, AlgorithmChoice::Xpress8K)]
    #[case(256 * 1024, AlgorithmChoice::Xpress16K)]
    #[case(8 * 1024 * 1024 - 1, AlgorithmChoice::Xpress16K)]
    #[case(8 * 1024 * 1024, AlgorithmChoice::Lzx)]
    fn test_size_bands(#[case] size: FileSize, #[case] expected: AlgorithmChoice) {
        let classifier = classifier_with(StubReader::default());
        assert_eq!(classifier.select_algorithm(size, true), expected);
    }

    #[test]
    fn test_lzx_not_permitted_falls_back() {
        let classifier = classifier_with(StubReader::default());
        assert_eq!(
            classifier.select_algorithm(50 * 1024 * 1024, false),
            AlgorithmChoice::Xpress16K
        );
    }

    #[test]
    fn test_checks_run_in_order() {
        let mut reader = StubReader::default();
        reader.compressed.insert(PathBuf::from("/d/done.log"));
        reader.broken.insert(PathBuf::from("/d/locked.log"));
        let classifier = classifier_with(reader);
        let caps = capabilities(CpuClass::LzxCapableMultiCore);

        // Extension wins over size
        let mut archive = FileEntry::new("/d/tiny.zip", 10);
        assert_eq!(
            classifier.classify(&mut archive, &caps, OperationMode::Normal),
            Classification::Skip(SkipReason::PoorYieldExtension("zip".into()))
        );

        let mut small = FileEntry::new("/d/small.log", 100);
        assert_eq!(
            classifier.classify(&mut small, &caps, OperationMode::Normal),
            Classification::Skip(SkipReason::TooSmall)
        );

        let mut done = FileEntry::new("/d/done.log", 100_000);
        assert_eq!(
            classifier.classify(&mut done, &caps, OperationMode::Normal),
            Classification::Skip(SkipReason::AlreadyCompressed)
        );
        assert_eq!(done.state, CompressionState::CompressedModern);

        let mut locked = FileEntry::new("/d/locked.log", 100_000);
        assert!(matches!(
            classifier.classify(&mut locked, &caps, OperationMode::Normal),
            Classification::Skip(SkipReason::Inaccessible(_))
        ));

        let mut log = FileEntry::new("/d/app.log", 100_000);
        assert_eq!(
            classifier.classify(&mut log, &caps, OperationMode::Normal),
            Classification::Compress(AlgorithmChoice::Xpress8K)
        );
        assert_eq!(log.on_disk_size, Some(1));
    }

    #[test]
    fn test_check_depth_follows_mode() {
        let reader = Arc::new(StubReader::default());
        let classifier = Classifier::new(ClassifierConfig::default(), reader.clone());
        let caps = capabilities(CpuClass::LzxCapableMultiCore);

        let mut entry = FileEntry::new("/d/a.log", 100_000);
        classifier.classify(&mut entry, &caps, OperationMode::Normal);
        classifier.classify(&mut entry, &caps, OperationMode::Thorough);
        classifier.classify(&mut entry, &caps, OperationMode::Branding);

        assert_eq!(
            *reader.depths.lock().unwrap(),
            vec![CheckDepth::Fast, CheckDepth::Exact, CheckDepth::Exact]
        );
    }

    #[test]
    fn test_dual_core_defaults_to_xpress_unless_forced() {
        let caps = capabilities(CpuClass::LzxCapableDualCore);
        let mut entry = FileEntry::new("/d/big.exe", 50 * 1024 * 1024);

        let auto = classifier_with(StubReader::default());
        assert_eq!(
            auto.classify(&mut entry, &caps, OperationMode::Normal),
            Classification::Compress(AlgorithmChoice::Xpress16K)
        );

        let forced = Classifier::new(
            ClassifierConfig {
                lzx_policy: LzxPolicy::ForceOn,
                ..ClassifierConfig::default()
            },
            Arc::new(StubReader::default()),
        );
        assert_eq!(
            forced.classify(&mut entry, &caps, OperationMode::Normal),
            Classification::Compress(AlgorithmChoice::Lzx)
        );
    }

    #[test]
    fn test_sampling_decides_inconclusive_files() {
        let temp_dir = TempDir::new().unwrap();
        let dense = temp_dir.path().join("dense.dat");
        let sparse = temp_dir.path().join("sparse.dat");
        let dense_bytes: Vec<u8> = (0..=255u8).cycle().take(128 * 1024).collect();
        std::fs::write(&dense, &dense_bytes).unwrap();
        std::fs::write(&sparse, vec![0u8; 128 * 1024]).unwrap();

        let classifier = classifier_with(StubReader::default());
        let caps = capabilities(CpuClass::LzxCapableMultiCore);

        let mut dense_entry = FileEntry::new(&dense, 128 * 1024);
        assert!(matches!(
            classifier.classify(&mut dense_entry, &caps, OperationMode::Normal),
            Classification::Skip(SkipReason::LowEstimatedYield(_))
        ));
        assert!(dense_entry.entropy.unwrap() > 7.9);

        let mut sparse_entry = FileEntry::new(&sparse, 128 * 1024);
        assert_eq!(
            classifier.classify(&mut sparse_entry, &caps, OperationMode::Normal),
            Classification::Compress(AlgorithmChoice::Xpress8K)
        );
    }

    #[test]
    fn test_sampling_disabled_compresses_inconclusive() {
        let classifier = Classifier::new(
            ClassifierConfig {
                entropy_sampling: false,
                ..ClassifierConfig::default()
            },
            Arc::new(StubReader::default()),
        );
        let mut entry = FileEntry::new("/d/missing.dat", 300_000);
        assert_eq!(
            classifier.triage(&mut entry, OperationMode::Normal, true),
            Triage::Definite(Classification::Compress(AlgorithmChoice::Xpress16K))
        );
    }

    #[test]
    fn test_sampling_read_error_is_inaccessible() {
        let classifier = classifier_with(StubReader::default());
        let caps = capabilities(CpuClass::LzxCapableMultiCore);
        let mut entry = FileEntry::new("/no/such/blob.dat", 300_000);
        assert!(matches!(
            classifier.classify(&mut entry, &caps, OperationMode::Normal),
            Classification::Skip(SkipReason::Inaccessible(_))
        ));
    }
}
