//! Task queue for managing pending frame fetches
//!
//! This module handles:
//! - Seeding the backlog from the configured time window
//! - Pruning timestamps already present in a loaded checkpoint
//! - FIFO dispatch with retries appended to the tail
//! - Parking transient failures until their retry delay elapses

use crate::config::WindowConfig;
use crate::state::Task;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::time::{Duration, Instant};

/// Errors returned by the task queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Task queue is empty")]
    Empty,
}

/// Ordered backlog of tasks waiting to be dispatched
///
/// Fresh tasks are served in timestamp order; a requeued task goes to the
/// back so it neither starves nor jumps ahead of untouched work.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerates `start, start + step, …` while `< end`
    ///
    /// # Arguments
    ///
    /// * `start_ms` - First timestamp (inclusive)
    /// * `end_ms` - Window bound (exclusive)
    /// * `step_ms` - Grid step; a non-positive step yields an empty queue
    pub fn seed(start_ms: i64, end_ms: i64, step_ms: i64) -> Self {
        let mut tasks = VecDeque::new();
        if step_ms > 0 {
            let mut t = start_ms;
            while t < end_ms {
                tasks.push_back(Task::new(t));
                t = match t.checked_add(step_ms) {
                    Some(next) => next,
                    None => break,
                };
            }
        }
        Self { tasks }
    }

    /// Seeds the queue from a configured window
    pub fn from_window(window: &WindowConfig) -> Self {
        Self::seed(window.start_ms(), window.end_ms(), window.step_ms)
    }

    /// Removes and returns the task at the front
    ///
    /// # Returns
    ///
    /// * `Ok(Task)` - The next task to dispatch
    /// * `Err(QueueError::Empty)` - The backlog is exhausted
    pub fn pop_front(&mut self) -> Result<Task, QueueError> {
        self.tasks.pop_front().ok_or(QueueError::Empty)
    }

    /// Re-enqueues a task at the tail
    pub fn push_back(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// Drops every task matching `predicate`, returning how many were removed
    pub fn remove_if<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Task) -> bool,
    {
        let before = self.tasks.len();
        self.tasks.retain(|task| !predicate(task));
        before - self.tasks.len()
    }

    /// Empties the queue, returning the tasks that were still pending
    pub fn drain(&mut self) -> Vec<Task> {
        self.tasks.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }
}

/// Tasks waiting out the transient-failure retry delay
///
/// The delay is fixed, so deadlines are pushed in non-decreasing order and a
/// plain FIFO is enough to find the earliest one.
#[derive(Debug, Default)]
pub struct DelayedRetries {
    waiting: VecDeque<(Instant, Task)>,
}

impl DelayedRetries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `task` until `delay` from now
    pub fn push(&mut self, task: Task, delay: Duration) {
        let due = Instant::now() + delay;
        // Keep the FIFO sorted even if a caller mixes delays
        let pos = self
            .waiting
            .iter()
            .rposition(|(at, _)| *at <= due)
            .map_or(0, |i| i + 1);
        self.waiting.insert(pos, (due, task));
    }

    /// Earliest deadline, if anything is waiting
    pub fn next_due(&self) -> Option<Instant> {
        self.waiting.front().map(|(at, _)| *at)
    }

    /// Moves every task whose deadline has passed to the tail of `queue`
    pub fn release_due(&mut self, now: Instant, queue: &mut TaskQueue) -> usize {
        let mut released = 0;
        while let Some((at, _)) = self.waiting.front() {
            if *at > now {
                break;
            }
            if let Some((_, task)) = self.waiting.pop_front() {
                queue.push_back(task);
                released += 1;
            }
        }
        released
    }

    /// Discards everything still waiting
    pub fn drain(&mut self) -> Vec<Task> {
        self.waiting.drain(..).map(|(_, task)| task).collect()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
