//! Batch progress spinner

use compactor_engine::{BatchRecord, BatchState};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Spinner fed by finished batches
pub struct BatchProgress {
    progress_bar: Option<ProgressBar>,
    handle: JoinHandle<()>,
}

impl BatchProgress {
    /// Start listening for batch records
    pub fn spawn(mut records: UnboundedReceiver<BatchRecord>, quiet: bool) -> Self {
        let progress_bar = if quiet {
            None
        } else {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} [{elapsed_precise}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message("Analyzing files...");
            pb.enable_steady_tick(Duration::from_millis(100));
            Some(pb)
        };

        let bar = progress_bar.clone();
        let handle = tokio::spawn(async move {
            let mut batches = 0usize;
            let mut files = 0usize;
            let mut partial = 0usize;
            while let Some(record) = records.recv().await {
                batches += 1;
                files += record.files;
                if record.state == BatchState::PartiallyFailed {
                    partial += 1;
                }
                if let Some(pb) = &bar {
                    pb.set_message(progress_message(batches, files, partial, &record));
                }
            }
        });

        Self {
            progress_bar,
            handle,
        }
    }

    /// Wait for the last record and clear the spinner
    pub async fn finish(self) {
        let _ = self.handle.await;
        if let Some(pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }
}

fn progress_message(batches: usize, files: usize, partial: usize, last: &BatchRecord) -> String {
    let mut message = format!(
        "Compressed {} batches ({} files), last {} in {:.1}s",
        batches,
        files,
        last.algorithm,
        last.elapsed.as_secs_f64()
    );
    if partial > 0 {
        message.push_str(&format!(", {} with failures", partial));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use compactor_types::AlgorithmChoice;

    #[test]
    fn test_progress_message() {
        let record = BatchRecord {
            index: 3,
            algorithm: AlgorithmChoice::Lzx,
            files: 10,
            state: BatchState::PartiallyFailed,
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(
            progress_message(4, 40, 1, &record),
            "Compressed 4 batches (40 files), last LZX in 1.5s, 1 with failures"
        );
    }

    #[tokio::test]
    async fn test_finish_after_sender_dropped() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let progress = BatchProgress::spawn(rx, true);
        tx.send(BatchRecord {
            index: 0,
            algorithm: AlgorithmChoice::Xpress4K,
            files: 1,
            state: BatchState::Completed,
            elapsed: Duration::ZERO,
        })
        .unwrap();
        drop(tx);
        progress.finish().await;
    }
}
