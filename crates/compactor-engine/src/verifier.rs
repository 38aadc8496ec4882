//! Post-run verification
//!
//! Fast attribute reads can miss WOF compression, and the legacy marking call
//! can report success without compressing anything. In Thorough and Branding
//! modes every file the backend claimed is read back with an exact check.

use compactor_types::{
    AttributeReader, CheckDepth, FailureReason, OperationMode, Outcome, RunResult,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Re-reads compressed files after a run
#[derive(Clone)]
pub struct Verifier {
    reader: Arc<dyn AttributeReader>,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier").finish_non_exhaustive()
    }
}

impl Verifier {
    /// Create a verifier
    pub fn new(reader: Arc<dyn AttributeReader>) -> Self {
        Self { reader }
    }

    /// Verify the compressed outcomes of a run
    pub fn verify(&self, mut result: RunResult, mode: OperationMode) -> RunResult {
        if !mode.verifies() {
            return result;
        }

        let mut checked = 0usize;
        let mut corrected = 0usize;
        for outcome in result
            .iter_mut()
            .filter(|o| o.outcome == Outcome::Compressed)
        {
            checked += 1;
            match self
                .reader
                .read_compression_state(&outcome.path, CheckDepth::Exact)
            {
                Ok(reading) if reading.state.is_compressed() => {
                    outcome.bytes_after = Some(reading.on_disk_size);
                }
                Ok(reading) => {
                    debug!(
                        "{} reported compressed but reads {:?}",
                        outcome.path.display(),
                        reading.state
                    );
                    outcome.outcome = Outcome::Failed(FailureReason::StillUnmarked);
                    outcome.bytes_after = Some(reading.on_disk_size);
                    corrected += 1;
                }
                Err(e) => {
                    outcome.outcome = Outcome::Failed(FailureReason::Verification(e.to_string()));
                    corrected += 1;
                }
            }
        }

        if corrected > 0 {
            warn!(
                "Verification found {} of {} files not compressed",
                corrected, checked
            );
        } else {
            info!("Verified {} compressed files", checked);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compactor_types::{
        AlgorithmChoice, AttributeReading, CompressionState, Error, FileEntry, FileOutcome,
        Result, SkipReason,
    };
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedReader {
        reads: AtomicUsize,
    }

    impl AttributeReader for ScriptedReader {
        fn read_compression_state(&self, path: &Path, depth: CheckDepth) -> Result<AttributeReading> {
            assert_eq!(depth, CheckDepth::Exact);
            self.reads.fetch_add(1, Ordering::SeqCst);
            match path.file_name().and_then(|n| n.to_str()) {
                Some("ok.log") => Ok(AttributeReading {
                    state: CompressionState::CompressedModern,
                    on_disk_size: 123,
                }),
                Some("gone.log") => Err(Error::TargetNotFound {
                    path: path.to_path_buf(),
                }),
                _ => Ok(AttributeReading {
                    state: CompressionState::Uncompressed,
                    on_disk_size: 1000,
                }),
            }
        }
    }

    fn result() -> RunResult {
        let mut result = RunResult::new();
        for name in ["ok.log", "unmarked.log", "gone.log"] {
            let entry = FileEntry::new(PathBuf::from("/d").join(name), 1000);
            result.record(FileOutcome::compressed(&entry, AlgorithmChoice::Xpress4K, Some(900)));
        }
        let skipped = FileEntry::new("/d/tiny.log", 10);
        result.record(FileOutcome::skipped(&skipped, SkipReason::TooSmall));
        result
    }

    #[test]
    fn test_normal_mode_is_a_no_op() {
        let reader = Arc::new(ScriptedReader {
            reads: AtomicUsize::new(0),
        });
        let input = result();
        let output = Verifier::new(reader.clone()).verify(input.clone(), OperationMode::Normal);
        assert_eq!(output, input);
        assert_eq!(reader.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_branding_corrects_outcomes() {
        let reader = Arc::new(ScriptedReader {
            reads: AtomicUsize::new(0),
        });
        let output = Verifier::new(reader.clone()).verify(result(), OperationMode::Branding);

        // Only compressed outcomes are re-read
        assert_eq!(reader.reads.load(Ordering::SeqCst), 3);

        let ok = output.get(Path::new("/d/ok.log")).unwrap();
        assert_eq!(ok.outcome, Outcome::Compressed);
        assert_eq!(ok.bytes_after, Some(123));

        assert_eq!(
            output.get(Path::new("/d/unmarked.log")).unwrap().outcome,
            Outcome::Failed(FailureReason::StillUnmarked)
        );
        assert!(matches!(
            output.get(Path::new("/d/gone.log")).unwrap().outcome,
            Outcome::Failed(FailureReason::Verification(_))
        ));
        assert_eq!(output.still_unmarked(), 1);
        assert_eq!(output.compressed(), 1);
    }
}
