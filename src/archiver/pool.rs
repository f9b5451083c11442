//! Bounded pool of in-flight frame fetches
//!
//! The pool never queues work internally: `submit` is refused once the
//! configured number of fetches is running, and the coordinator must wait
//! on `await_any` before trying again. Completions come back through a
//! single `JoinSet`, polled only by the coordinator.

use crate::archiver::fetcher::FrameFetcher;
use crate::state::{Record, Task};
use crate::FetchError;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Opaque handle identifying one in-flight fetch
pub type TaskHandle = Id;

/// Reasons a submission was refused; the task is handed back untouched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Pool is at capacity")]
    AtCapacity(Task),

    #[error("Pool is shutting down")]
    Cancelled(Task),
}

impl PoolError {
    /// Recovers the refused task
    pub fn into_task(self) -> Task {
        match self {
            Self::AtCapacity(task) | Self::Cancelled(task) => task,
        }
    }
}

/// A settled fetch
#[derive(Debug)]
pub struct Completion {
    pub handle: TaskHandle,
    pub task: Task,
    pub outcome: Result<Record, FetchError>,
}

/// Caps simultaneously running fetches and multiplexes their completions
pub struct FetchPool {
    fetcher: Arc<dyn FrameFetcher>,
    capacity: usize,
    cancel: CancellationToken,
    running: JoinSet<Result<Record, FetchError>>,
    in_flight: HashMap<TaskHandle, Task>,
    high_water: usize,
}

impl FetchPool {
    /// Creates a pool
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum fetches in flight at once (at least 1)
    /// * `fetcher` - The frame source every submission calls
    /// * `cancel` - Shared abort signal; once tripped the pool refuses work
    ///   and running fetches resolve as `FetchError::Cancelled`
    pub fn new(capacity: usize, fetcher: Arc<dyn FrameFetcher>, cancel: CancellationToken) -> Self {
        Self {
            fetcher,
            capacity: capacity.max(1),
            cancel,
            running: JoinSet::new(),
            in_flight: HashMap::new(),
            high_water: 0,
        }
    }

    /// Starts fetching `task` in the background
    ///
    /// # Returns
    ///
    /// * `Ok(TaskHandle)` - The fetch is running
    /// * `Err(PoolError::AtCapacity)` - Wait on `await_any` and retry
    /// * `Err(PoolError::Cancelled)` - The abort signal has been tripped
    pub fn submit(&mut self, task: Task) -> Result<TaskHandle, PoolError> {
        if self.cancel.is_cancelled() {
            return Err(PoolError::Cancelled(task));
        }
        if self.is_full() {
            return Err(PoolError::AtCapacity(task));
        }

        let fetcher = Arc::clone(&self.fetcher);
        let cancel = self.cancel.clone();
        let timestamp = task.timestamp;

        let abort_handle = self.running.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                result = fetcher.fetch(timestamp, cancel.clone()) => result,
            }
        });

        let handle = abort_handle.id();
        self.in_flight.insert(handle, task);
        self.high_water = self.high_water.max(self.in_flight.len());
        tracing::trace!("Submitted {} ({} in flight)", task, self.in_flight.len());
        Ok(handle)
    }

    /// Waits for any one in-flight fetch to settle
    ///
    /// Returns `None` when nothing is in flight. Cancel-safe: dropping the
    /// future loses no completion.
    pub async fn await_any(&mut self) -> Option<Completion> {
        loop {
            let joined = self.running.join_next_with_id().await?;
            if let Some(completion) = self.settle(joined) {
                return Some(completion);
            }
        }
    }

    /// Waits for every remaining fetch to settle
    pub async fn await_all(&mut self) -> Vec<Completion> {
        let mut settled = Vec::with_capacity(self.in_flight.len());
        while let Some(completion) = self.await_any().await {
            settled.push(completion);
        }
        settled
    }

    fn settle(
        &mut self,
        joined: Result<(Id, Result<Record, FetchError>), JoinError>,
    ) -> Option<Completion> {
        let (handle, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome),
            Err(e) if e.is_cancelled() => (e.id(), Err(FetchError::Cancelled)),
            Err(e) => {
                tracing::error!("Fetch task failed: {}", e);
                (
                    e.id(),
                    Err(FetchError::Validation(format!("Fetch task panicked: {}", e))),
                )
            }
        };

        match self.in_flight.remove(&handle) {
            Some(task) => Some(Completion {
                handle,
                task,
                outcome,
            }),
            None => {
                tracing::warn!("Completion for unknown fetch {:?}", handle);
                None
            }
        }
    }

    /// Number of fetches currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_full(&self) -> bool {
        self.in_flight.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest number of fetches that were ever in flight together
    pub fn high_water_mark(&self) -> usize {
        self.high_water
    }
}
