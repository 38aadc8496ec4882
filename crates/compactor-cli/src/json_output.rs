//! JSON output structures for the Compactor CLI

use crate::display::skip_label;
use compactor_engine::{DirectorySkip, DryRunReport, PoolSizing, RunReport, RunTimings};
use compactor_types::{Capabilities, Outcome, RunResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete JSON output for a compression run
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReportJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Probed capabilities
    pub capabilities: Capabilities,
    /// Worker pool sizing
    pub sizing: PoolSizing,
    /// Outcome counts and byte totals
    pub summary: SummaryJson,
    /// Stage timings in milliseconds
    pub timings: TimingsJson,
    /// Throughput figures
    pub throughput: ThroughputJson,
    /// Adjustments made because of degraded capabilities
    pub decisions: Vec<String>,
    /// Directories left out of the scan
    pub excluded: Vec<ExcludedDirectoryJson>,
    /// Files that failed
    pub failures: Vec<FailureJson>,
    /// Overall result
    pub result: OperationResult,
}

/// JSON output for a dry run
#[derive(Debug, Serialize, Deserialize)]
pub struct DryRunJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Probed capabilities
    pub capabilities: Capabilities,
    /// Worker pool sizing
    pub sizing: PoolSizing,
    /// Planned batches
    pub batches: Vec<PlannedBatchJson>,
    /// Files the classifier left out, grouped by reason
    pub skipped: BTreeMap<String, usize>,
    /// Adjustments made because of degraded capabilities
    pub decisions: Vec<String>,
    /// Directories left out of the scan
    pub excluded: Vec<ExcludedDirectoryJson>,
    /// Stage timings in milliseconds
    pub timings: TimingsJson,
}

/// Operation metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// Compactor version
    pub version: String,
    /// Run identifier
    pub run_id: String,
    /// Operation mode
    pub mode: String,
    /// Timestamp when the run started
    pub timestamp: String,
    /// Target directory
    pub target: String,
}

/// Outcome counts
#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryJson {
    /// Files seen by the scanner
    pub files_scanned: usize,
    /// Bytes seen by the scanner
    pub bytes_scanned: u64,
    /// Batches planned
    pub batches_planned: usize,
    /// Files compressed by this run
    pub compressed: usize,
    /// Files already compressed before the run
    pub already_compressed: usize,
    /// Files skipped
    pub skipped: usize,
    /// Files that failed
    pub failed: usize,
    /// Files the backend accepted but left unmarked
    pub still_unmarked: usize,
    /// Directory walk errors
    pub walk_errors: usize,
    /// Logical bytes of compressed files
    pub bytes_processed: u64,
    /// Bytes reclaimed
    pub space_saved: u64,
    /// Skipped files grouped by reason
    pub skip_reasons: BTreeMap<String, usize>,
}

impl SummaryJson {
    fn from_report(report: &RunReport) -> Self {
        let result = &report.result;
        Self {
            files_scanned: report.files_scanned,
            bytes_scanned: report.bytes_scanned,
            batches_planned: report.batches_planned,
            compressed: result.compressed(),
            already_compressed: result.already_compressed(),
            skipped: result.skipped(),
            failed: result.failed(),
            still_unmarked: result.still_unmarked(),
            walk_errors: report.walk_errors,
            bytes_processed: result.bytes_processed(),
            space_saved: result.space_saved(),
            skip_reasons: skip_reasons(result),
        }
    }
}

/// Stage timings in milliseconds
#[derive(Debug, Serialize, Deserialize)]
pub struct TimingsJson {
    /// Capability probe
    pub probe_ms: u128,
    /// Directory scan
    pub scan_ms: u128,
    /// Classification
    pub classify_ms: u128,
    /// Batch planning
    pub plan_ms: u128,
    /// XPRESS pool wall time
    pub xpress_pool_ms: u128,
    /// LZX pool wall time
    pub lzx_pool_ms: u128,
    /// Execution wall time
    pub execute_ms: u128,
    /// Verification
    pub verify_ms: u128,
    /// Whole run
    pub total_ms: u128,
}

impl From<&RunTimings> for TimingsJson {
    fn from(timings: &RunTimings) -> Self {
        Self {
            probe_ms: timings.probe.as_millis(),
            scan_ms: timings.scan.as_millis(),
            classify_ms: timings.classify.as_millis(),
            plan_ms: timings.plan.as_millis(),
            xpress_pool_ms: timings.xpress_pool.as_millis(),
            lzx_pool_ms: timings.lzx_pool.as_millis(),
            execute_ms: timings.execute.as_millis(),
            verify_ms: timings.verify.as_millis(),
            total_ms: timings.total.as_millis(),
        }
    }
}

/// Throughput figures
#[derive(Debug, Serialize, Deserialize)]
pub struct ThroughputJson {
    /// Files scanned per second
    pub scan_files_per_second: f64,
    /// Files compressed per second of execution
    pub compress_files_per_second: f64,
    /// Bytes compressed per second of execution
    pub compress_bytes_per_second: f64,
}

/// A directory left out of the scan
#[derive(Debug, Serialize, Deserialize)]
pub struct ExcludedDirectoryJson {
    /// Path relative to the target
    pub path: String,
    /// Why it was excluded
    pub reason: String,
    /// Estimated savings when the directory was sampled
    pub estimated_savings_percent: Option<f64>,
    /// Files sampled
    pub sampled_files: usize,
}

impl From<&DirectorySkip> for ExcludedDirectoryJson {
    fn from(skip: &DirectorySkip) -> Self {
        Self {
            path: skip.relative_path.display().to_string(),
            reason: skip.reason.clone(),
            estimated_savings_percent: skip.estimated_savings,
            sampled_files: skip.sampled_files,
        }
    }
}

/// A failed file
#[derive(Debug, Serialize, Deserialize)]
pub struct FailureJson {
    /// File path
    pub path: String,
    /// Algorithm attempted
    pub algorithm: Option<String>,
    /// Failure description
    pub reason: String,
}

/// A planned batch
#[derive(Debug, Serialize, Deserialize)]
pub struct PlannedBatchJson {
    /// Planning index
    pub index: usize,
    /// Algorithm
    pub algorithm: String,
    /// Files in the batch
    pub files: usize,
    /// Logical bytes in the batch
    pub bytes: u64,
}

/// Overall operation result
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResult {
    /// At least one file compressed, or nothing failed
    pub success: bool,
    /// The run was cancelled
    pub cancelled: bool,
    /// Short description
    pub message: String,
}

impl RunReportJson {
    /// Build the JSON view of a finished run
    pub fn from_report(report: &RunReport) -> Self {
        let result = &report.result;
        let scan = report.scan_throughput();
        let work = report.work_throughput();

        let success = !result.all_failed();
        let message = if report.cancelled {
            "Run cancelled".to_string()
        } else if result.all_failed() {
            "No file could be compressed".to_string()
        } else if result.compressed() == 0 {
            "Nothing to compress".to_string()
        } else {
            format!("Compressed {} files", result.compressed())
        };

        Self {
            metadata: OperationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                run_id: report.run_id.to_string(),
                mode: report.mode.to_string(),
                timestamp: report.started_at.to_rfc3339(),
                target: report.target.display().to_string(),
            },
            capabilities: report.capabilities.clone(),
            sizing: report.sizing,
            summary: SummaryJson::from_report(report),
            timings: TimingsJson::from(&report.timings),
            throughput: ThroughputJson {
                scan_files_per_second: scan.files_per_second,
                compress_files_per_second: work.files_per_second,
                compress_bytes_per_second: work.bytes_per_second,
            },
            decisions: report.decisions.iter().map(ToString::to_string).collect(),
            excluded: report.excluded.iter().map(Into::into).collect(),
            failures: failures(result),
            result: OperationResult {
                success,
                cancelled: report.cancelled,
                message,
            },
        }
    }
}

impl DryRunJson {
    /// Build the JSON view of a dry run
    pub fn from_report(report: &DryRunReport) -> Self {
        Self {
            metadata: OperationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                run_id: report.run_id.to_string(),
                mode: report.mode.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                target: report.target.display().to_string(),
            },
            capabilities: report.capabilities.clone(),
            sizing: report.sizing,
            batches: report
                .batches
                .iter()
                .map(|batch| PlannedBatchJson {
                    index: batch.index,
                    algorithm: batch.algorithm.to_string(),
                    files: batch.len(),
                    bytes: batch.total_bytes(),
                })
                .collect(),
            skipped: skip_reasons(&report.result),
            decisions: report.decisions.iter().map(ToString::to_string).collect(),
            excluded: report.excluded.iter().map(Into::into).collect(),
            timings: TimingsJson::from(&report.timings),
        }
    }
}

fn skip_reasons(result: &RunResult) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for outcome in result.iter() {
        if let Outcome::Skipped(reason) = &outcome.outcome {
            *counts.entry(skip_label(reason).to_string()).or_insert(0) += 1;
        }
    }
    counts
}

fn failures(result: &RunResult) -> Vec<FailureJson> {
    result
        .iter()
        .filter_map(|outcome| match &outcome.outcome {
            Outcome::Failed(reason) => Some(FailureJson {
                path: outcome.path.display().to_string(),
                algorithm: outcome.algorithm.map(|a| a.to_string()),
                reason: reason.to_string(),
            }),
            _ => None,
        })
        .collect()
}
