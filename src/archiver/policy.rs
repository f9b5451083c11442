//! Retry and abort policy
//!
//! Every failed fetch is classified here, synchronously, into a `Decision`
//! that the coordinator carries out. The policy never sleeps and never
//! touches the queue itself.
//!
//! | Failure | Task retries | Error budget | Outcome |
//! |---------|--------------|--------------|---------|
//! | Cancelled | - | - | Discard |
//! | Transient | unchanged | unchanged | RetryAfter(delay) |
//! | Validation, budget spent | +1 | +1 | Abort |
//! | Validation, task limit hit | +1 | +1 | Abandon |
//! | Validation, otherwise | +1 | +1 | Requeue |

use crate::config::SchedulerConfig;
use crate::state::{RunState, Task};
use crate::FetchError;
use std::time::Duration;

/// What the coordinator should do with a failed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Push the task to the tail of the queue right away
    Requeue(Task),

    /// Push the task to the tail of the queue once the delay has elapsed
    RetryAfter(Task, Duration),

    /// Drop the task for good; it never reaches the record set
    Abandon(Task),

    /// The error budget is spent and the abort signal has been tripped
    Abort,

    /// The fetch was cancelled; nothing to record
    Discard,
}

/// Failure classification rules for a run
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    retry_limit: u32,
    transient_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy
    ///
    /// # Arguments
    ///
    /// * `retry_limit` - Validation failures a task may accumulate before it is abandoned
    /// * `transient_delay` - Wait before retrying after a network-class failure
    pub fn new(retry_limit: u32, transient_delay: Duration) -> Self {
        Self {
            retry_limit,
            transient_delay,
        }
    }

    /// Builds the policy from scheduler configuration
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            config.retry_limit_per_task,
            Duration::from_millis(config.transient_retry_delay_ms),
        )
    }

    /// Decides what happens to `task` after it failed with `error`
    ///
    /// Validation failures are charged to both the task and the run; when the
    /// run's budget runs out the shared abort signal is tripped here.
    pub fn decide(&self, task: Task, error: &FetchError, run: &mut RunState) -> Decision {
        match error {
            FetchError::Cancelled => Decision::Discard,
            _ if run.is_aborted() => Decision::Discard,

            FetchError::Transient(_) => {
                run.transient_retries += 1;
                Decision::RetryAfter(task, self.transient_delay)
            }

            FetchError::Validation(_) => {
                let task = task.with_retry();

                if run.record_error() {
                    run.abort();
                    return Decision::Abort;
                }

                if task.retry_count >= self.retry_limit {
                    run.abandoned.push(task.timestamp);
                    return Decision::Abandon(task);
                }

                Decision::Requeue(task)
            }
        }
    }
}
