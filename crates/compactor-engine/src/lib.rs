//! Classification, planning and execution engine for Compactor
//!
//! This crate turns a target directory into compressed files:
//!
//! - **Scanning**: deterministic directory walk that prunes protected system
//!   directories, application caches and incompressible trees
//! - **Classification**: extension triage, attribute reads and entropy sampling
//!   decide per file whether to compress and with which algorithm
//! - **Planning**: files are grouped into batches per algorithm
//! - **Execution**: XPRESS and LZX worker pools drive the compression backend
//!   under a global concurrency cap, with cancellation
//! - **Verification**: exact re-reads catch files the backend did not compress
//!
//! # Examples
//!
//! ```rust,no_run
//! use compactor_config::Config;
//! use compactor_engine::{Pipeline, RunRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let pipeline = Pipeline::new(config.clone());
//! let request = RunRequest::from_config("D:\\Games", &config);
//! let report = pipeline.run(&request, CancellationToken::new()).await?;
//! println!("Saved {} bytes", report.result.space_saved());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod attributes;
pub mod backend;
pub mod classifier;
pub mod entropy;
pub mod executor;
pub mod extensions;
pub mod monitor;
pub mod pipeline;
pub mod planner;
pub mod pool;
pub mod scanner;
pub mod verifier;

pub use attributes::PlatformAttributeReader;
pub use backend::{CompactBackend, CompactFlavour};
pub use classifier::{Classifier, ClassifierConfig, Triage};
pub use executor::{BatchRecord, BatchState, ExecutionOutput, Executor, ExecutorConfig, PoolReport};
pub use monitor::{RunTimings, Throughput};
pub use pipeline::{policy_decisions, DryRunReport, Pipeline, RunReport, RunRequest};
pub use planner::{Batch, BatchPlanner, PlannerConfig};
pub use pool::PoolSizing;
pub use scanner::{DirectorySkip, DirectorySkipCategory, ScanOptions, ScanOutput, Scanner};
pub use verifier::Verifier;
