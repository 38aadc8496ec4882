//! Batch executor
//!
//! Runs planned batches through two worker pools, one per algorithm family.
//! Each pool has a fixed number of workers pulling from its own FIFO queue, and
//! every backend invocation holds a permit from a semaphore shared by both
//! pools. Backend calls block, so they run on the blocking thread pool.

use crate::planner::Batch;
use crate::pool::PoolSizing;
use compactor_config::Config;
use compactor_types::{
    AlgorithmChoice, AlgorithmFamily, AttributeReader, CheckDepth, CompressionBackend,
    FailureReason, FileOutcome, FileSize, PathStatus,
};
use futures::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the batch executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Batches running longer than this are logged once, never interrupted
    pub batch_soft_timeout: Duration,
}

impl ExecutorConfig {
    /// Create executor config from main config
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_soft_timeout: config.execution.batch_soft_timeout(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_soft_timeout: Duration::from_secs(600),
        }
    }
}

/// Lifecycle of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BatchState {
    /// Not started
    Planned,
    /// Backend invocation in flight
    Running,
    /// Every file was applied
    Completed,
    /// At least one file failed
    PartiallyFailed,
}

/// What happened to one batch
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BatchRecord {
    /// Batch index from the plan
    pub index: usize,
    /// Algorithm of the batch
    pub algorithm: AlgorithmChoice,
    /// Number of files
    pub files: usize,
    /// Final state
    pub state: BatchState,
    /// Time spent in the backend, zero when never started
    pub elapsed: Duration,
}

/// Wall time and volume of one pool
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolReport {
    /// Family served by the pool
    pub family: AlgorithmFamily,
    /// Workers the pool ran with
    pub workers: usize,
    /// Time from pool start until its last worker finished
    pub wall_time: Duration,
    /// Batches the pool started
    pub batches: usize,
}

impl PoolReport {
    fn idle(family: AlgorithmFamily, workers: usize) -> Self {
        Self {
            family,
            workers,
            wall_time: Duration::ZERO,
            batches: 0,
        }
    }
}

/// Result of executing a plan
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// One outcome per planned file
    pub outcomes: Vec<FileOutcome>,
    /// One record per planned batch, in plan order
    pub batches: Vec<BatchRecord>,
    /// XPRESS pool report
    pub xpress: PoolReport,
    /// LZX pool report
    pub lzx: PoolReport,
    /// Whether cancellation stopped the run early
    pub cancelled: bool,
}

/// Results owned by a single worker until the pool finishes
#[derive(Debug, Default)]
struct WorkerShard {
    outcomes: Vec<FileOutcome>,
    records: Vec<BatchRecord>,
    /// Batch taken from the queue and not yet recorded
    in_flight: Option<Batch>,
}

impl WorkerShard {
    /// Record a batch the worker took but never finished as failed
    fn settle(mut self) -> Self {
        if let Some(batch) = self.in_flight.take() {
            warn!("Batch {} lost its worker, marking its files failed", batch.index);
            self.outcomes
                .extend(fail_all(&batch, "worker task failed before the batch finished"));
            self.records.push(BatchRecord {
                index: batch.index,
                algorithm: batch.algorithm,
                files: batch.len(),
                state: BatchState::PartiallyFailed,
                elapsed: Duration::ZERO,
            });
        }
        self
    }
}

/// Shard written by a worker task and read back by its pool, even if the task dies
type SharedShard = Arc<std::sync::Mutex<WorkerShard>>;

type BatchQueue = Arc<Mutex<VecDeque<Batch>>>;

fn lock_shard(shard: &SharedShard) -> std::sync::MutexGuard<'_, WorkerShard> {
    shard.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Runs batches against a compression backend
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn CompressionBackend>,
    reader: Arc<dyn AttributeReader>,
    config: ExecutorConfig,
    progress: Option<mpsc::UnboundedSender<BatchRecord>>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Create an executor
    pub fn new(
        backend: Arc<dyn CompressionBackend>,
        reader: Arc<dyn AttributeReader>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            backend,
            reader,
            config,
            progress: None,
        }
    }

    /// Send a record for every finished batch
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<BatchRecord>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Execute every batch
    ///
    /// Once `cancel` fires no further batch is started. Running invocations
    /// finish and keep their results. Files of batches that never started are
    /// reported as cancelled.
    pub async fn execute(
        &self,
        batches: Vec<Batch>,
        sizing: &PoolSizing,
        cancel: CancellationToken,
    ) -> ExecutionOutput {
        let (lzx, xpress): (VecDeque<Batch>, VecDeque<Batch>) = batches
            .into_iter()
            .filter(|b| !b.is_empty())
            .partition(|b| b.family() == AlgorithmFamily::Lzx);

        info!(
            "Executing {} XPRESS and {} LZX batches ({} / {} workers, cap {})",
            xpress.len(),
            lzx.len(),
            sizing.xpress_workers,
            sizing.lzx_workers,
            sizing.global_cap
        );

        let semaphore = Arc::new(Semaphore::new(sizing.global_cap.max(1)));
        let xpress_queue: BatchQueue = Arc::new(Mutex::new(xpress));
        let lzx_queue: BatchQueue = Arc::new(Mutex::new(lzx));

        let ((xpress_report, xpress_shards), (lzx_report, lzx_shards)) = tokio::join!(
            self.run_pool(
                AlgorithmFamily::Xpress,
                sizing.xpress_workers,
                xpress_queue.clone(),
                semaphore.clone(),
                cancel.clone(),
            ),
            self.run_pool(
                AlgorithmFamily::Lzx,
                sizing.lzx_workers,
                lzx_queue.clone(),
                semaphore.clone(),
                cancel.clone(),
            ),
        );

        let mut outcomes = Vec::new();
        let mut records = Vec::new();
        for shard in xpress_shards.into_iter().chain(lzx_shards) {
            outcomes.extend(shard.outcomes);
            records.extend(shard.records);
        }

        for queue in [xpress_queue, lzx_queue] {
            for batch in queue.lock().await.drain(..) {
                debug!("Batch {} not started", batch.index);
                outcomes.extend(batch.entries.iter().map(|entry| {
                    FileOutcome::failed(entry, batch.algorithm, FailureReason::Cancelled)
                }));
                records.push(BatchRecord {
                    index: batch.index,
                    algorithm: batch.algorithm,
                    files: batch.len(),
                    state: BatchState::Planned,
                    elapsed: Duration::ZERO,
                });
            }
        }
        records.sort_by_key(|r| r.index);

        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!("Execution cancelled, unstarted batches marked as cancelled");
        }

        ExecutionOutput {
            outcomes,
            batches: records,
            xpress: xpress_report,
            lzx: lzx_report,
            cancelled,
        }
    }

    async fn run_pool(
        &self,
        family: AlgorithmFamily,
        workers: usize,
        queue: BatchQueue,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> (PoolReport, Vec<WorkerShard>) {
        let workers = workers.max(1);
        if queue.lock().await.is_empty() {
            return (PoolReport::idle(family, workers), Vec::new());
        }

        let start = Instant::now();
        let shared: Vec<SharedShard> = (0..workers).map(|_| SharedShard::default()).collect();
        let handles: Vec<_> = shared
            .iter()
            .enumerate()
            .map(|(worker, shard)| {
                let this = self.clone();
                let queue = queue.clone();
                let semaphore = semaphore.clone();
                let cancel = cancel.clone();
                let shard = shard.clone();
                tokio::spawn(async move {
                    this.worker_loop(family, worker, queue, semaphore, cancel, shard)
                        .await;
                })
            })
            .collect();

        for (worker, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                error!("{} worker {} task failed: {}", family, worker, e);
            }
        }
        let shards: Vec<WorkerShard> = shared
            .iter()
            .map(|shard| std::mem::take(&mut *lock_shard(shard)).settle())
            .collect();

        let report = PoolReport {
            family,
            workers,
            wall_time: start.elapsed(),
            batches: shards.iter().map(|s| s.records.len()).sum(),
        };
        info!(
            "{} pool finished {} batches in {:?}",
            family, report.batches, report.wall_time
        );
        (report, shards)
    }

    async fn worker_loop(
        self,
        family: AlgorithmFamily,
        worker: usize,
        queue: BatchQueue,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
        shard: SharedShard,
    ) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some(batch) = queue.lock().await.pop_front() else {
                break;
            };
            lock_shard(&shard).in_flight = Some(batch.clone());

            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                lock_shard(&shard).in_flight = None;
                queue.lock().await.push_front(batch);
                break;
            };

            debug!("{} worker {} starting batch {}", family, worker, batch.index);
            let (outcomes, record) = self.run_batch(batch).await;
            drop(permit);

            if let Some(progress) = &self.progress {
                let _ = progress.send(record.clone());
            }
            let mut recorded = lock_shard(&shard);
            recorded.in_flight = None;
            recorded.outcomes.extend(outcomes);
            recorded.records.push(record);
        }
    }

    async fn run_batch(&self, batch: Batch) -> (Vec<FileOutcome>, BatchRecord) {
        let start = Instant::now();
        let paths = batch.paths();
        let algorithm = batch.algorithm;
        let backend = self.backend.clone();
        let reader = self.reader.clone();

        let mut handle = tokio::task::spawn_blocking(move || {
            backend.apply(&paths, algorithm).map(|statuses| {
                statuses
                    .into_iter()
                    .map(|(path, status)| {
                        let after = match status {
                            PathStatus::Applied => reader
                                .read_compression_state(&path, CheckDepth::Fast)
                                .ok()
                                .map(|r| r.on_disk_size),
                            PathStatus::Failed(_) => None,
                        };
                        (path, (status, after))
                    })
                    .collect::<HashMap<PathBuf, (PathStatus, Option<FileSize>)>>()
            })
        });

        let soft_timeout = tokio::time::sleep(self.config.batch_soft_timeout);
        tokio::pin!(soft_timeout);
        let mut warned = false;
        let joined = loop {
            tokio::select! {
                joined = &mut handle => break joined,
                () = &mut soft_timeout, if !warned => {
                    warned = true;
                    warn!(
                        "Batch {} ({} files, {}) still running after {:?}",
                        batch.index,
                        batch.len(),
                        algorithm,
                        self.config.batch_soft_timeout
                    );
                }
            }
        };

        let outcomes: Vec<FileOutcome> = match joined {
            Ok(Ok(mut statuses)) => batch
                .entries
                .iter()
                .map(|entry| match statuses.remove(entry.path()) {
                    Some((PathStatus::Applied, after)) => {
                        FileOutcome::compressed(entry, algorithm, after)
                    }
                    Some((PathStatus::Failed(message), _)) => {
                        FileOutcome::failed(entry, algorithm, FailureReason::Backend(message))
                    }
                    None => FileOutcome::failed(
                        entry,
                        algorithm,
                        FailureReason::Backend("no status reported".to_string()),
                    ),
                })
                .collect(),
            Ok(Err(e)) => {
                error!("Batch {} failed: {}", batch.index, e);
                fail_all(&batch, &e.to_string())
            }
            Err(e) => {
                error!("Batch {} backend task aborted: {}", batch.index, e);
                fail_all(&batch, &format!("backend task aborted: {}", e))
            }
        };

        let state = if outcomes
            .iter()
            .all(|o| o.outcome == compactor_types::Outcome::Compressed)
        {
            BatchState::Completed
        } else {
            BatchState::PartiallyFailed
        };

        let record = BatchRecord {
            index: batch.index,
            algorithm,
            files: batch.len(),
            state,
            elapsed: start.elapsed(),
        };
        debug!(
            "Batch {} {:?} in {:?}",
            record.index, record.state, record.elapsed
        );
        (outcomes, record)
    }
}

fn fail_all(batch: &Batch, message: &str) -> Vec<FileOutcome> {
    batch
        .entries
        .iter()
        .map(|entry| {
            FileOutcome::failed(
                entry,
                batch.algorithm,
                FailureReason::Backend(message.to_string()),
            )
        })
        .collect()
}
