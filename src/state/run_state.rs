use tokio_util::sync::CancellationToken;

/// Process-wide counters for a single archive run
///
/// Owned by the coordinator and handed by `&mut` to the retry policy; the
/// abort token is the only piece shared with in-flight fetches.
#[derive(Debug)]
pub struct RunState {
    /// Validation-class failures seen so far
    pub error_count: u32,

    /// Validation failures tolerated before the run is aborted
    pub abort_threshold: u32,

    /// Successful fetches this run
    pub successes: u64,

    /// Successful fetches since the last checkpoint was written
    pub successes_since_checkpoint: u64,

    /// Transient failures that were parked for a delayed retry
    pub transient_retries: u64,

    /// Timestamps given up on after exhausting their retries
    pub abandoned: Vec<i64>,

    abort: CancellationToken,
    aborted_by_budget: bool,
}

impl RunState {
    /// Creates run state with a fresh abort token
    pub fn new(abort_threshold: u32) -> Self {
        Self::with_token(abort_threshold, CancellationToken::new())
    }

    /// Creates run state around an existing abort token
    pub fn with_token(abort_threshold: u32, abort: CancellationToken) -> Self {
        Self {
            error_count: 0,
            abort_threshold,
            successes: 0,
            successes_since_checkpoint: 0,
            transient_retries: 0,
            abandoned: Vec::new(),
            abort,
            aborted_by_budget: false,
        }
    }

    /// Returns a handle to the shared abort signal
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Whether the abort signal has been tripped (by the budget or externally)
    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Whether the abort was caused by exhausting the error budget
    pub fn budget_exhausted(&self) -> bool {
        self.aborted_by_budget
    }

    /// Records a validation failure and reports whether the budget is now spent
    pub fn record_error(&mut self) -> bool {
        self.error_count = self.error_count.saturating_add(1);
        self.error_count >= self.abort_threshold
    }

    /// Trips the abort signal because the error budget ran out
    pub fn abort(&mut self) {
        self.aborted_by_budget = true;
        self.abort.cancel();
    }

    /// Counts a successful fetch toward the checkpoint cadence
    pub fn record_success(&mut self) {
        self.successes += 1;
        self.successes_since_checkpoint += 1;
    }

    /// Returns true (and resets the counter) once `cadence` successes have accrued
    pub fn checkpoint_due(&mut self, cadence: u64) -> bool {
        if self.successes_since_checkpoint >= cadence {
            self.successes_since_checkpoint = 0;
            true
        } else {
            false
        }
    }
}
