//! Archive coordinator - main run orchestration logic
//!
//! This module contains the control loop that ties the archive together:
//! - Loading a previous checkpoint and pruning the backlog against it
//! - Dispatching tasks into the bounded fetch pool
//! - Routing failures through the retry policy
//! - Writing periodic and final checkpoints
//! - Orderly shutdown on abort or interrupt

use crate::archiver::fetcher::{FrameFetcher, GraphqlFrameFetcher};
use crate::archiver::policy::{Decision, RetryPolicy};
use crate::archiver::pool::{Completion, FetchPool};
use crate::archiver::scheduler::{DelayedRetries, TaskQueue};
use crate::config::{Config, WindowConfig};
use crate::state::{RecordSet, RunState};
use crate::storage::{CheckpointStore, JsonCheckpointStore, StorageResult};
use crate::{ArchiverError, FetchError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Summary of a run that finished without abort
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Records fetched during this run
    pub fetched: u64,

    /// Records in the final artifact (including resumed ones)
    pub total_records: usize,

    /// Timestamps given up on after exhausting their retries
    pub abandoned: Vec<i64>,

    /// Validation failures seen
    pub validation_errors: u32,

    /// Transient failures that were retried after the delay
    pub transient_retries: u64,

    /// Most fetches ever in flight together
    pub peak_in_flight: usize,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

/// Seeds the backlog for `window` and prunes it against the stored checkpoint
///
/// # Returns
///
/// The remaining task queue and the record set loaded from the checkpoint
/// (empty when `fresh` is set or nothing was saved yet).
pub fn plan_run(
    window: &WindowConfig,
    store: &dyn CheckpointStore,
    fresh: bool,
) -> StorageResult<(TaskQueue, RecordSet)> {
    tracing::info!("Preparing to scrape...");
    let mut queue = TaskQueue::from_window(window);

    if fresh {
        tracing::info!("Fresh run requested, ignoring any existing checkpoint");
        return Ok((queue, RecordSet::new()));
    }

    let records = match store.load()? {
        Some(loaded) => {
            let records = RecordSet::from_records(loaded);
            let pruned = queue.remove_if(|task| records.contains(task.timestamp));
            tracing::info!(
                "Resuming: {} records on disk, {} timestamps already covered",
                records.len(),
                pruned
            );
            records
        }
        None => {
            tracing::info!("No existing checkpoint, starting new run");
            RecordSet::new()
        }
    };

    Ok((queue, records))
}

/// Main archive coordinator structure
pub struct Coordinator {
    store: Arc<dyn CheckpointStore + Send + Sync>,
    fetcher: Arc<dyn FrameFetcher>,
    policy: RetryPolicy,
    queue: TaskQueue,
    delayed: DelayedRetries,
    records: RecordSet,
    run: RunState,
    max_concurrency: usize,
    checkpoint_cadence: u64,
    started: std::time::Instant,
}

impl Coordinator {
    /// Creates a coordinator backed by the JSON checkpoint and the GraphQL fetcher
    ///
    /// # Arguments
    ///
    /// * `config` - The archiver configuration
    /// * `fresh` - Ignore (and eventually overwrite) an existing checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(ArchiverError)` - Checkpoint unreadable, token missing, or client build failed
    pub fn new(config: Config, fresh: bool) -> Result<Self, ArchiverError> {
        let fragment_count = config.scheduler.fragment_count;
        let store = JsonCheckpointStore::new(Path::new(&config.output.checkpoint_path), fragment_count);
        let fetcher = GraphqlFrameFetcher::new(&config.fetcher, fragment_count)?;

        Self::with_components(&config, Box::new(store), Arc::new(fetcher), fresh)
    }

    /// Creates a coordinator around caller-supplied collaborators
    pub fn with_components(
        config: &Config,
        store: Box<dyn CheckpointStore + Send + Sync>,
        fetcher: Arc<dyn FrameFetcher>,
        fresh: bool,
    ) -> Result<Self, ArchiverError> {
        let (queue, records) = plan_run(&config.window, store.as_ref(), fresh)?;

        Ok(Self {
            store: Arc::from(store),
            fetcher,
            policy: RetryPolicy::from_config(&config.scheduler),
            queue,
            delayed: DelayedRetries::new(),
            records,
            run: RunState::new(config.scheduler.error_abort_threshold),
            max_concurrency: config.scheduler.max_concurrency as usize,
            checkpoint_cadence: config.scheduler.checkpoint_cadence,
            started: std::time::Instant::now(),
        })
    }

    /// Handle to the shared abort signal
    ///
    /// Cancelling it stops dispatch; the run then drains and saves as on abort.
    pub fn abort_token(&self) -> CancellationToken {
        self.run.abort_token()
    }

    /// Number of timestamps still waiting to be fetched
    pub fn pending(&self) -> usize {
        self.queue.len() + self.delayed.len()
    }

    /// Number of records currently held
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Runs the main fetch loop to completion
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - Every task was fetched or abandoned
    /// * `Err(ArchiverError::RunAborted)` - The error budget ran out
    /// * `Err(ArchiverError::Interrupted)` - The abort signal was tripped externally
    ///
    /// In every case the final checkpoint has been written before returning.
    pub async fn run(&mut self) -> Result<RunReport, ArchiverError> {
        tracing::info!(
            "Scraping {} timestamps with concurrency {}...",
            self.queue.len(),
            self.max_concurrency
        );

        self.started = std::time::Instant::now();
        let cancel = self.run.abort_token();
        let mut pool = FetchPool::new(self.max_concurrency, Arc::clone(&self.fetcher), cancel.clone());

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.delayed.release_due(Instant::now(), &mut self.queue);

            if !pool.is_full() {
                if let Ok(task) = self.queue.pop_front() {
                    if let Err(refused) = pool.submit(task) {
                        self.queue.push_back(refused.into_task());
                    }
                    continue;
                }
            }

            if pool.is_empty() {
                // Only delayed retries (if anything) remain
                match self.delayed.next_due() {
                    None => break,
                    Some(due) => {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = sleep_until(due) => {}
                        }
                        continue;
                    }
                }
            }

            let completion = match self.delayed.next_due() {
                Some(due) => tokio::select! {
                    completion = pool.await_any() => completion,
                    _ = sleep_until(due) => continue,
                },
                None => pool.await_any().await,
            };

            if let Some(completion) = completion {
                self.handle_completion(completion).await;
            }
        }

        if !pool.is_empty() {
            tracing::info!("Draining {} in-flight fetches...", pool.in_flight());
        }
        for completion in pool.await_all().await {
            self.handle_completion(completion).await;
        }

        self.finish(pool.high_water_mark()).await
    }

    /// Applies one settled fetch to the record set or the retry policy
    async fn handle_completion(&mut self, completion: Completion) {
        let Completion { task, outcome, .. } = completion;

        let error = match outcome {
            Ok(record) if record.timestamp == task.timestamp => {
                if self.records.insert(record) {
                    self.run.record_success();
                    if self.run.checkpoint_due(self.checkpoint_cadence) {
                        self.report_progress();
                        self.save_checkpoint().await;
                    }
                } else {
                    tracing::debug!("Ignoring duplicate record for {}", task);
                }
                return;
            }
            Ok(record) => FetchError::Validation(format!(
                "Fetcher returned record {} for task {}",
                record.timestamp, task.timestamp
            )),
            Err(e) => e,
        };

        match self.policy.decide(task, &error, &mut self.run) {
            Decision::Requeue(task) => {
                tracing::debug!("Requeueing {} (attempt {})", task, task.retry_count);
                self.queue.push_back(task);
            }
            Decision::RetryAfter(task, delay) => {
                tracing::debug!("Transient failure for {}, retrying in {:?}", task, delay);
                self.delayed.push(task, delay);
            }
            Decision::Abandon(task) => {
                tracing::warn!(
                    "Retry abandoned for {} after {} attempts.",
                    task,
                    task.retry_count
                );
            }
            Decision::Abort => {
                tracing::error!(
                    "Aborted due to excessive errors ({} validation errors)",
                    self.run.error_count
                );
            }
            Decision::Discard => {}
        }
    }

    /// Writes an intermediate checkpoint; failures are logged and retried at the next one
    async fn save_checkpoint(&self) {
        tracing::info!("Checkpoint reached.");
        if let Err(e) = self.write_records().await {
            tracing::error!("Failed to write checkpoint: {}", e);
        }
    }

    /// Saves a snapshot of the record set on the blocking pool
    async fn write_records(&self) -> StorageResult<()> {
        let store = Arc::clone(&self.store);
        let records = self.records.records().to_vec();
        tokio::task::spawn_blocking(move || store.save(&records)).await?
    }

    fn report_progress(&self) {
        let done = self.run.successes;
        let rate = done as f64 / self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        tracing::info!(
            "Progress: {} fetched, {} pending, {:.2} frames/sec",
            done,
            self.pending(),
            rate
        );
    }

    /// Sorts, writes the final checkpoint, and turns the run state into a result
    async fn finish(&mut self, peak_in_flight: usize) -> Result<RunReport, ArchiverError> {
        let elapsed = self.started.elapsed();
        let skipped = self.queue.drain().len() + self.delayed.drain().len();
        if skipped > 0 {
            tracing::warn!("{} timestamps left unfetched", skipped);
        }

        self.records.sort();
        self.write_records().await?;

        let records = self.records.len();
        if self.run.budget_exhausted() {
            return Err(ArchiverError::RunAborted {
                error_count: self.run.error_count,
                records,
            });
        }
        if self.run.is_aborted() {
            return Err(ArchiverError::Interrupted { records });
        }

        tracing::info!(
            "Scraping complete: {} fetched, {} abandoned, {} records in {:?}",
            self.run.successes,
            self.run.abandoned.len(),
            records,
            elapsed
        );

        Ok(RunReport {
            fetched: self.run.successes,
            total_records: records,
            abandoned: self.run.abandoned.clone(),
            validation_errors: self.run.error_count,
            transient_retries: self.run.transient_retries,
            peak_in_flight,
            elapsed,
        })
    }
}

/// Runs a complete archive operation
///
/// Ctrl-C trips the abort signal, so an interrupted run still drains
/// in-flight fetches and writes its checkpoint.
///
/// # Example
///
/// ```no_run
/// use frame_archiver::config::load_config;
/// use frame_archiver::archiver::run_archive;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("archiver.toml"))?;
/// run_archive(config, false).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_archive(config: Config, fresh: bool) -> Result<RunReport, ArchiverError> {
    let mut coordinator = Coordinator::new(config, fresh)?;

    let token = coordinator.abort_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight fetches...");
            token.cancel();
        }
    });

    let result = coordinator.run().await;
    interrupt.abort();
    result
}
