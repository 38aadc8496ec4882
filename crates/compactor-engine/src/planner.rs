//! Batch planner
//!
//! Turns per-file algorithm assignments into backend batches. Batches never mix
//! algorithms, and each one stays within both the file count and the command
//! line length the backend accepts.

use compactor_config::Config;
use compactor_types::{AlgorithmChoice, AlgorithmFamily, BatchSize, FileEntry, FileSize};
use std::path::PathBuf;
use tracing::debug;

/// Characters a path adds to a command line beyond its own length: quotes and a space
const PATH_OVERHEAD: usize = 3;

/// Files compressed together by one backend invocation
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Batch {
    /// Position in planning order
    pub index: usize,
    /// Algorithm shared by every entry
    pub algorithm: AlgorithmChoice,
    /// Entries in input order
    pub entries: Vec<FileEntry>,
}

impl Batch {
    /// Paths handed to the backend
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.path().to_path_buf()).collect()
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch holds no files
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Worker pool the batch belongs to
    pub fn family(&self) -> AlgorithmFamily {
        self.algorithm.family().unwrap_or(AlgorithmFamily::Xpress)
    }

    /// Logical bytes covered by the batch
    pub fn total_bytes(&self) -> FileSize {
        self.entries.iter().map(FileEntry::size).sum()
    }
}

/// Planner configuration
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Maximum files per batch
    pub batch_size: BatchSize,
    /// Maximum command line length
    pub max_command_chars: usize,
}

impl PlannerConfig {
    /// Create planner config from main config
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.planner.batch_size(),
            max_command_chars: config.planner.max_command_chars,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Groups classified files into batches
#[derive(Debug, Clone, Default)]
pub struct BatchPlanner {
    config: PlannerConfig,
}

impl BatchPlanner {
    /// Create a planner
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Plan batches for the given assignments
    ///
    /// Groups follow [`AlgorithmChoice::PLANNING_ORDER`] and keep input order
    /// inside each group. A single path longer than the command limit still
    /// gets a batch of its own.
    pub fn plan(&self, assignments: &[(FileEntry, AlgorithmChoice)]) -> Vec<Batch> {
        let max_files = self.config.batch_size.get();
        let mut batches = Vec::new();

        for algorithm in AlgorithmChoice::PLANNING_ORDER {
            let mut current: Vec<FileEntry> = Vec::new();
            let mut current_chars = 0usize;

            for (entry, _) in assignments.iter().filter(|(_, a)| *a == algorithm) {
                let path_chars = entry.path().as_os_str().len() + PATH_OVERHEAD;
                let full = current.len() >= max_files
                    || current_chars + path_chars > self.config.max_command_chars;
                if !current.is_empty() && full {
                    batches.push(Batch {
                        index: batches.len(),
                        algorithm,
                        entries: std::mem::take(&mut current),
                    });
                    current_chars = 0;
                }
                current.push(entry.clone());
                current_chars += path_chars;
            }

            if !current.is_empty() {
                batches.push(Batch {
                    index: batches.len(),
                    algorithm,
                    entries: current,
                });
            }
        }

        let skipped_none = assignments
            .iter()
            .filter(|(_, a)| *a == AlgorithmChoice::None)
            .count();
        if skipped_none > 0 {
            debug!("{} entries without an algorithm left out of the plan", skipped_none);
        }
        debug!(
            "Planned {} batches for {} files",
            batches.len(),
            assignments.len() - skipped_none
        );
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn planner(batch_size: usize, max_command_chars: usize) -> BatchPlanner {
        BatchPlanner::new(PlannerConfig {
            batch_size: BatchSize::new(batch_size).unwrap(),
            max_command_chars,
        })
    }

    fn assignment(name: &str, algorithm: AlgorithmChoice) -> (FileEntry, AlgorithmChoice) {
        (FileEntry::new(format!("/d/{}", name), 10_000), algorithm)
    }

    #[test]
    fn test_groups_follow_planning_order() {
        let input = vec![
            assignment("a", AlgorithmChoice::Xpress4K),
            assignment("b", AlgorithmChoice::Lzx),
            assignment("c", AlgorithmChoice::Xpress16K),
            assignment("d", AlgorithmChoice::Xpress4K),
            assignment("e", AlgorithmChoice::None),
        ];
        let batches = planner(100, 4000).plan(&input);

        let algorithms: Vec<_> = batches.iter().map(|b| b.algorithm).collect();
        assert_eq!(
            algorithms,
            vec![
                AlgorithmChoice::Lzx,
                AlgorithmChoice::Xpress16K,
                AlgorithmChoice::Xpress4K
            ]
        );
        assert_eq!(
            batches[2].paths(),
            vec![PathBuf::from("/d/a"), PathBuf::from("/d/d")]
        );
        assert!(batches.iter().enumerate().all(|(i, b)| b.index == i));
        assert_eq!(batches[0].family(), AlgorithmFamily::Lzx);
    }

    #[test]
    fn test_chunks_by_count() {
        let input: Vec<_> = (0..25)
            .map(|i| assignment(&format!("f{:02}", i), AlgorithmChoice::Xpress8K))
            .collect();
        let sizes: Vec<_> = planner(10, 100_000).plan(&input).iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn test_chunks_by_command_length() {
        // "/d/fNN" is 6 chars, 9 with overhead, so 4 fit in 40
        let input: Vec<_> = (0..10)
            .map(|i| assignment(&format!("f{:02}", i), AlgorithmChoice::Xpress8K))
            .collect();
        let sizes: Vec<_> = planner(100, 40).plan(&input).iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_oversized_path_gets_own_batch() {
        let input = vec![
            assignment("short", AlgorithmChoice::Xpress4K),
            assignment(&"x".repeat(200), AlgorithmChoice::Xpress4K),
        ];
        let batches = planner(100, 50).plan(&input);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(planner(100, 4000).plan(&[]).is_empty());
    }

    fn algorithm_strategy() -> impl Strategy<Value = AlgorithmChoice> {
        prop_oneof![
            Just(AlgorithmChoice::None),
            Just(AlgorithmChoice::Xpress4K),
            Just(AlgorithmChoice::Xpress8K),
            Just(AlgorithmChoice::Xpress16K),
            Just(AlgorithmChoice::Lzx),
        ]
    }

    proptest! {
        #[test]
        fn prop_every_file_planned_once(
            algorithms in prop::collection::vec(algorithm_strategy(), 0..300),
            batch_size in 1usize..50,
            max_chars in 10usize..500,
        ) {
            let input: Vec<_> = algorithms
                .iter()
                .enumerate()
                .map(|(i, a)| assignment(&format!("file{}", i), *a))
                .collect();
            let planner = planner(batch_size, max_chars);
            let batches = planner.plan(&input);

            let mut seen: HashMap<PathBuf, AlgorithmChoice> = HashMap::new();
            for batch in &batches {
                prop_assert!(!batch.is_empty());
                prop_assert!(batch.len() <= batch_size);
                prop_assert!(batch.algorithm != AlgorithmChoice::None);
                for entry in &batch.entries {
                    prop_assert!(seen.insert(entry.path().to_path_buf(), batch.algorithm).is_none());
                }
            }

            let expected = input.iter().filter(|(_, a)| *a != AlgorithmChoice::None).count();
            prop_assert_eq!(seen.len(), expected);
            for (entry, algorithm) in &input {
                if *algorithm != AlgorithmChoice::None {
                    prop_assert_eq!(seen.get(entry.path()), Some(algorithm));
                }
            }

            prop_assert_eq!(planner.plan(&input), batches);
        }
    }
}
