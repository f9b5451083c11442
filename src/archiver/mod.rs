//! Archiver module for frame fetching and run orchestration
//!
//! This module contains the core archiving logic, including:
//! - The frame fetcher contract and its GraphQL implementation
//! - The task queue and delayed retries
//! - The bounded fetch pool
//! - Failure classification and abort policy
//! - Overall run coordination

mod coordinator;
mod fetcher;
mod policy;
mod pool;
mod scheduler;

pub use coordinator::{plan_run, run_archive, Coordinator, RunReport};
pub use fetcher::{
    build_http_client, decode_fragments, frame_history_body, FrameFetcher, FrameHistoryResponse,
    GraphqlFrameFetcher,
};
pub use policy::{Decision, RetryPolicy};
pub use pool::{Completion, FetchPool, PoolError, TaskHandle};
pub use scheduler::{DelayedRetries, QueueError, TaskQueue};

use crate::config::Config;
use crate::ArchiverError;

/// Runs a complete archive operation
///
/// This is the main entry point for starting a run. It will:
/// 1. Load the checkpoint (unless `fresh`) and prune the backlog
/// 2. Build the HTTP client and read the auth token
/// 3. Dispatch fetches with bounded concurrency
/// 4. Retry, abandon or abort according to the policy
/// 5. Write periodic checkpoints and a final sorted artifact
///
/// # Returns
///
/// * `Ok(RunReport)` - Run completed
/// * `Err(ArchiverError)` - Run aborted, interrupted, or failed to start
pub async fn archive(config: Config, fresh: bool) -> Result<RunReport, ArchiverError> {
    run_archive(config, fresh).await
}
