//! Run pipeline
//!
//! Wires the stages together: probe, scan, classify, plan, execute, verify.
//! Fatal errors surface before any file is touched. Everything after the scan
//! is recorded per file in the [`RunResult`].

use crate::attributes::PlatformAttributeReader;
use crate::backend::CompactBackend;
use crate::classifier::{Classifier, ClassifierConfig};
use crate::executor::{BatchRecord, Executor, ExecutorConfig};
use crate::monitor::{RunTimings, Stopwatch, Throughput};
use crate::planner::{Batch, BatchPlanner, PlannerConfig};
use crate::pool::PoolSizing;
use crate::scanner::{DirectorySkip, ScanOptions, ScanOutput, Scanner};
use chrono::{DateTime, Utc};
use compactor_config::Config;
use compactor_device::CapabilityProbe;
use compactor_types::{
    AlgorithmChoice, AttributeReader, Capabilities, Classification, CompressionBackend, CpuClass,
    Error, FileEntry, FileOutcome, LzxPolicy, OperationMode, PolicyDecision, Result, RunId,
    RunResult, SavingsThreshold, WorkerCap,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What to compress and how
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunRequest {
    /// Target directory
    pub target: PathBuf,
    /// Operation mode
    pub mode: OperationMode,
    /// LZX policy
    pub lzx_policy: LzxPolicy,
    /// Worker cap
    pub worker_cap: WorkerCap,
    /// Minimum estimated savings for sampled files
    pub min_savings: SavingsThreshold,
    /// Sample content when the extension is inconclusive
    pub entropy_sampling: bool,
}

impl RunRequest {
    /// Request with default settings
    pub fn new<P: Into<PathBuf>>(target: P) -> Self {
        Self::from_config(target, &Config::default())
    }

    /// Request using the run settings of a configuration
    pub fn from_config<P: Into<PathBuf>>(target: P, config: &Config) -> Self {
        Self {
            target: target.into(),
            mode: config.run.mode,
            lzx_policy: config.run.lzx_policy,
            worker_cap: config.run.worker_cap(),
            min_savings: config.run.savings_threshold(),
            entropy_sampling: config.run.entropy_sampling,
        }
    }
}

/// Everything a completed run produced
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunReport {
    /// Run identifier
    pub run_id: RunId,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Target directory
    pub target: PathBuf,
    /// Operation mode
    pub mode: OperationMode,
    /// Probed capabilities
    pub capabilities: Capabilities,
    /// Pool sizes used
    pub sizing: PoolSizing,
    /// Per-file outcomes
    pub result: RunResult,
    /// Stage timings
    pub timings: RunTimings,
    /// Decisions taken because of degraded capabilities
    pub decisions: Vec<PolicyDecision>,
    /// Directories the scanner did not enter
    pub excluded: Vec<DirectorySkip>,
    /// Entries the scanner could not read
    pub walk_errors: usize,
    /// Files found by the scanner
    pub files_scanned: usize,
    /// Logical bytes found by the scanner
    pub bytes_scanned: u64,
    /// Batches in the plan
    pub batches_planned: usize,
    /// Per-batch records
    pub batches: Vec<BatchRecord>,
    /// Whether the run was cancelled
    pub cancelled: bool,
}

impl RunReport {
    /// Scan rate over the scan stage
    pub fn scan_throughput(&self) -> Throughput {
        Throughput::over(self.files_scanned, self.bytes_scanned, self.timings.scan)
    }

    /// Compression rate over the execution stage
    ///
    /// Counts files and bytes compressed in this run.
    pub fn work_throughput(&self) -> Throughput {
        Throughput::over(
            self.result.compressed(),
            self.result.bytes_processed(),
            self.timings.execute,
        )
    }

    /// Whether files reported compressed turned out not to be
    pub fn has_still_unmarked(&self) -> bool {
        self.result.still_unmarked() > 0
    }
}

/// The plan of a run that was not executed
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DryRunReport {
    /// Run identifier
    pub run_id: RunId,
    /// Target directory
    pub target: PathBuf,
    /// Operation mode
    pub mode: OperationMode,
    /// Probed capabilities
    pub capabilities: Capabilities,
    /// Pool sizes that would be used
    pub sizing: PoolSizing,
    /// Decisions taken because of degraded capabilities
    pub decisions: Vec<PolicyDecision>,
    /// Planned batches
    pub batches: Vec<Batch>,
    /// Outcomes of files that would not be compressed
    pub result: RunResult,
    /// Directories the scanner did not enter
    pub excluded: Vec<DirectorySkip>,
    /// Stage timings up to planning
    pub timings: RunTimings,
}

impl DryRunReport {
    /// Files that would be compressed
    pub fn planned_files(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}

/// Output of the stages shared by real and dry runs
struct Prepared {
    capabilities: Arc<Capabilities>,
    sizing: PoolSizing,
    decisions: Vec<PolicyDecision>,
    scan: ScanOutput,
    result: RunResult,
    assignments: Vec<(FileEntry, AlgorithmChoice)>,
    batches: Vec<Batch>,
    files_scanned: usize,
    bytes_scanned: u64,
}

/// Compression pipeline
#[derive(Clone)]
pub struct Pipeline {
    config: Config,
    probe: CapabilityProbe,
    probed: Option<(Arc<Capabilities>, Duration)>,
    reader: Arc<dyn AttributeReader>,
    backend: Option<Arc<dyn CompressionBackend>>,
    sample_cache_entropy: bool,
    progress: Option<mpsc::UnboundedSender<BatchRecord>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("probe", &self.probe)
            .field("probed", &self.probed.is_some())
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline using the host OS for everything
    pub fn new(config: Config) -> Self {
        Self {
            config,
            probe: CapabilityProbe::new(),
            probed: None,
            reader: Arc::new(PlatformAttributeReader::new()),
            backend: None,
            sample_cache_entropy: false,
            progress: None,
        }
    }

    /// Replace the capability probe
    pub fn with_probe(mut self, probe: CapabilityProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Use capabilities probed before the run instead of probing again
    ///
    /// `elapsed` is what the earlier probe took and is reported as the probe
    /// stage. The capabilities must have been probed for the request target.
    pub fn with_capabilities(mut self, capabilities: Arc<Capabilities>, elapsed: Duration) -> Self {
        self.probed = Some((capabilities, elapsed));
        self
    }

    /// Replace the attribute reader
    pub fn with_reader(mut self, reader: Arc<dyn AttributeReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Use a fixed backend instead of `compact.exe`
    pub fn with_backend(mut self, backend: Arc<dyn CompressionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sample pruned cache directories for the report
    pub fn with_cache_sampling(mut self, enabled: bool) -> Self {
        self.sample_cache_entropy = enabled;
        self
    }

    /// Receive a record for each finished batch
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<BatchRecord>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every stage
    pub async fn run(&self, request: &RunRequest, cancel: CancellationToken) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut watch = Stopwatch::start();
        let mut timings = RunTimings::default();
        info!(
            "Run {} started for {} in {} mode",
            run_id,
            request.target.display(),
            request.mode
        );

        let prepared = self.prepare(request, &mut watch, &mut timings).await?;
        let Prepared {
            capabilities,
            sizing,
            decisions,
            scan,
            mut result,
            batches,
            files_scanned,
            bytes_scanned,
            ..
        } = prepared;
        let batches_planned = batches.len();

        let backend = self.backend.clone().unwrap_or_else(|| {
            Arc::new(CompactBackend::for_mode(request.mode).with_reader(self.reader.clone()))
        });
        let mut executor = Executor::new(
            backend,
            self.reader.clone(),
            ExecutorConfig::from_config(&self.config),
        );
        if let Some(progress) = &self.progress {
            executor = executor.with_progress(progress.clone());
        }

        let execution = executor.execute(batches, &sizing, cancel).await;
        timings.execute = watch.lap();
        timings.xpress_pool = execution.xpress.wall_time;
        timings.lzx_pool = execution.lzx.wall_time;
        result.merge(execution.outcomes);

        let verifier = crate::verifier::Verifier::new(self.reader.clone());
        let mode = request.mode;
        let result = tokio::task::spawn_blocking(move || verifier.verify(result, mode))
            .await
            .map_err(|e| Error::other(format!("Verification task failed: {}", e)))?;
        timings.verify = watch.lap();
        timings.total = watch.total();

        info!(
            "Run {} finished: {} compressed, {} already compressed, {} skipped, {} failed, {} bytes saved",
            run_id,
            result.compressed(),
            result.already_compressed(),
            result.skipped(),
            result.failed(),
            result.space_saved()
        );

        Ok(RunReport {
            run_id,
            started_at,
            target: request.target.clone(),
            mode: request.mode,
            capabilities: (*capabilities).clone(),
            sizing,
            result,
            timings,
            decisions,
            excluded: scan.excluded,
            walk_errors: scan.walk_errors,
            files_scanned,
            bytes_scanned,
            batches_planned,
            batches: execution.batches,
            cancelled: execution.cancelled,
        })
    }

    /// Probe, scan, classify and plan without touching any file
    pub async fn dry_run(&self, request: &RunRequest) -> Result<DryRunReport> {
        let mut watch = Stopwatch::start();
        let mut timings = RunTimings::default();
        let prepared = self.prepare(request, &mut watch, &mut timings).await?;
        timings.total = watch.total();

        info!(
            "Dry run: {} files in {} batches",
            prepared.assignments.len(),
            prepared.batches.len()
        );
        Ok(DryRunReport {
            run_id: Uuid::new_v4(),
            target: request.target.clone(),
            mode: request.mode,
            capabilities: (*prepared.capabilities).clone(),
            sizing: prepared.sizing,
            decisions: prepared.decisions,
            batches: prepared.batches,
            result: prepared.result,
            excluded: prepared.scan.excluded,
            timings,
        })
    }

    async fn prepare(
        &self,
        request: &RunRequest,
        watch: &mut Stopwatch,
        timings: &mut RunTimings,
    ) -> Result<Prepared> {
        let capabilities = match &self.probed {
            Some((capabilities, elapsed)) => {
                watch.lap();
                timings.probe = *elapsed;
                capabilities.clone()
            }
            None => {
                let capabilities = Arc::new(self.probe.probe(&request.target).await?);
                timings.probe = watch.lap();
                capabilities
            }
        };

        let decisions = policy_decisions(&capabilities, request);
        for decision in &decisions {
            info!("Policy: {}", decision);
        }
        let sizing = PoolSizing::derive(&capabilities, request.worker_cap);
        debug!("Pool sizing: {:?}", sizing);

        let scanner = Scanner::new(ScanOptions {
            volume_root: Some(capabilities.volume.root.clone()),
            sample_cache_entropy: self.sample_cache_entropy,
            prune_high_entropy: request.entropy_sampling,
            min_savings: request.min_savings,
        });
        let target = request.target.clone();
        let mut scan = tokio::task::spawn_blocking(move || scanner.scan(&target))
            .await
            .map_err(|e| Error::other(format!("Scan task failed: {}", e)))??;
        timings.scan = watch.lap();
        let files_scanned = scan.entries.len();
        let bytes_scanned = scan.total_bytes();

        let classifier = Classifier::new(
            ClassifierConfig {
                min_savings: request.min_savings,
                entropy_sampling: request.entropy_sampling,
                lzx_policy: request.lzx_policy,
                ..ClassifierConfig::from_config(&self.config)
            },
            self.reader.clone(),
        );
        let entries = std::mem::take(&mut scan.entries);
        let classified =
            classify_parallel(&classifier, entries, &capabilities, request.mode).await?;
        timings.classify = watch.lap();

        let mut result = RunResult::new();
        let mut assignments = Vec::new();
        for (entry, classification) in classified {
            match classification {
                Classification::Compress(algorithm) => assignments.push((entry, algorithm)),
                Classification::Skip(reason) => {
                    result.record(FileOutcome::skipped(&entry, reason));
                }
            }
        }

        let batches =
            BatchPlanner::new(PlannerConfig::from_config(&self.config)).plan(&assignments);
        timings.plan = watch.lap();

        Ok(Prepared {
            capabilities,
            sizing,
            decisions,
            scan,
            result,
            assignments,
            batches,
            files_scanned,
            bytes_scanned,
        })
    }
}

/// Classify entries on the blocking pool, keeping input order
async fn classify_parallel(
    classifier: &Classifier,
    entries: Vec<FileEntry>,
    capabilities: &Arc<Capabilities>,
    mode: OperationMode,
) -> Result<Vec<(FileEntry, Classification)>> {
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let workers = capabilities.cpu.physical_cores.saturating_sub(1).max(1);
    let chunk_size = entries.len().div_ceil(workers);
    let mut chunks = Vec::with_capacity(workers);
    let mut remaining = entries;
    while !remaining.is_empty() {
        let rest = remaining.split_off(chunk_size.min(remaining.len()));
        chunks.push(std::mem::replace(&mut remaining, rest));
    }

    let handles: Vec<_> = chunks
        .into_iter()
        .map(|chunk| {
            let classifier = classifier.clone();
            let capabilities = capabilities.clone();
            tokio::task::spawn_blocking(move || {
                chunk
                    .into_iter()
                    .map(|mut entry| {
                        let classification = classifier.classify(&mut entry, &capabilities, mode);
                        (entry, classification)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut classified = Vec::new();
    for joined in futures::future::join_all(handles).await {
        classified
            .extend(joined.map_err(|e| Error::other(format!("Classification task failed: {}", e)))?);
    }
    Ok(classified)
}

/// Decisions forced by the host and volume for this request
pub fn policy_decisions(capabilities: &Capabilities, request: &RunRequest) -> Vec<PolicyDecision> {
    let mut decisions = Vec::new();

    if capabilities.recommends_single_worker() {
        match request.worker_cap {
            WorkerCap::Auto => decisions.push(PolicyDecision::SingleWorkerThrottle {
                reason: "rotational drive detected".to_string(),
            }),
            WorkerCap::Fixed(count) => decisions.push(PolicyDecision::WorkerOverrideOnHdd {
                workers: count.get(),
            }),
            WorkerCap::SingleWorker => {}
        }
    }

    match request.lzx_policy {
        LzxPolicy::ForceOff => decisions.push(PolicyDecision::LzxDisabled {
            reason: "disabled by request".to_string(),
        }),
        LzxPolicy::Auto if !capabilities.lzx_permitted(LzxPolicy::Auto) => {
            let reason = match capabilities.cpu.class {
                CpuClass::BelowLzxThreshold => "CPU throughput below the LZX threshold",
                _ => "dual-core CPU, LZX needs an explicit opt-in",
            };
            decisions.push(PolicyDecision::LzxDisabled {
                reason: reason.to_string(),
            });
        }
        LzxPolicy::Auto | LzxPolicy::ForceOn => {}
    }

    if capabilities.volume.rotational_hint_missing {
        decisions.push(PolicyDecision::RotationalHintMissing);
    }

    decisions
}
