//! # Sync Engine
//!
//! Mirrors a local media tree into a remote catalog service.
//!
//! ## Overview
//!
//! A run walks the configured root, compares what it finds with the local
//! catalog and pushes the difference to the remote service:
//! - Files pass the exclusion rules before they are considered
//! - New files are created remotely, changed files updated, vanished files deleted
//! - Remote calls are rate limited and retried by error class
//! - The catalog records each item only after its remote call succeeded
//! - One run at a time, guarded by an exclusive lock file
//!
//! ## Components
//!
//! - **Exclusion Rules** (`exclusion`): folder, pattern, extension and size filters
//! - **Scanner** (`scanner`): lazy walk of the root producing fingerprinted candidates
//! - **Raw Conversion** (`convert`): external tool producing uploadable copies
//! - **Reconciler** (`reconciler`): turns scan results and the catalog snapshot into a plan
//! - **Rate Limiter** (`rate_limiter`): minimum spacing between remote calls
//! - **Worker Pool** (`worker_pool`): bounded concurrent execution of the plan
//! - **Run Lock** (`run_lock`): cross-process exclusivity
//! - **Run History** (`repository`): persisted record of each run
//! - **Run Coordinator** (`coordinator`): lock, scan, plan, execute, summarize
//! - **Audit** (`audit`): read-only catalog/remote comparison

pub mod audit;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod exclusion;
pub mod progress;
pub mod rate_limiter;
pub mod reconciler;
pub mod repository;
pub mod run;
pub mod run_lock;
pub mod scanner;
pub mod worker_pool;

pub use audit::AuditReport;
pub use convert::ExternalToolConverter;
pub use coordinator::RunCoordinator;
pub use error::{LockError, Result, SyncError};
pub use exclusion::ExclusionRules;
pub use progress::{EventBusProgress, NoopProgress, ProgressSink};
pub use rate_limiter::RateLimiter;
pub use reconciler::{reconcile, Operation, OperationKind, ReconcilePlan, ScanFailure};
pub use repository::{RunHistoryRepository, RunRecord, SqliteRunHistoryRepository};
pub use run::{ItemFailure, RunContext, RunId, RunOutcome, RunStats, RunStatus, RunSummary};
pub use run_lock::RunLockGuard;
pub use scanner::{ScanCandidate, ScanEntry, Scanner};
pub use worker_pool::{PoolReport, WorkerPool};
