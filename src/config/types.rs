use crate::state::DEFAULT_FRAGMENT_COUNT;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Main configuration structure for Frame-Archiver
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub window: WindowConfig,
    pub scheduler: SchedulerConfig,
    pub fetcher: FetcherConfig,
    pub output: OutputConfig,
}

/// The time window the archive must cover
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    /// First timestamp to fetch (inclusive, RFC 3339)
    pub start: DateTime<Utc>,

    /// Upper bound of the window (exclusive, RFC 3339)
    pub end: DateTime<Utc>,

    /// Distance between consecutive frames (milliseconds)
    #[serde(rename = "step-ms")]
    pub step_ms: i64,
}

impl WindowConfig {
    /// Window start in epoch milliseconds
    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// Window end in epoch milliseconds
    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// Number of frames on the step grid inside `[start, end)`
    pub fn slot_count(&self) -> u64 {
        let span = self.end_ms() - self.start_ms();
        if span <= 0 || self.step_ms <= 0 {
            return 0;
        }
        ((span + self.step_ms - 1) / self.step_ms) as u64
    }
}

/// Scheduling, retry and checkpoint behavior
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of fetches in flight at once
    #[serde(rename = "max-concurrency")]
    pub max_concurrency: u32,

    /// Validation failures a single task may accumulate before it is abandoned
    #[serde(rename = "retry-limit-per-task")]
    pub retry_limit_per_task: u32,

    /// Validation failures across the run before everything is aborted
    #[serde(rename = "error-abort-threshold")]
    pub error_abort_threshold: u32,

    /// Successful fetches between checkpoint writes
    #[serde(rename = "checkpoint-cadence")]
    pub checkpoint_cadence: u64,

    /// Delay before retrying after a transient network failure (milliseconds)
    #[serde(rename = "transient-retry-delay-ms")]
    pub transient_retry_delay_ms: u64,

    /// Number of fragment slots in every record
    #[serde(rename = "fragment-count", default = "default_fragment_count")]
    pub fragment_count: usize,
}

/// Remote frame source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// GraphQL endpoint URL
    pub endpoint: String,

    /// File holding the bearer token
    #[serde(rename = "auth-token-path")]
    pub auth_token_path: String,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Optional Referer header
    #[serde(default)]
    pub referer: Option<String>,

    /// Optional HTTP(S) proxy URL
    #[serde(default)]
    pub proxy: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Amount subtracted from a frame timestamp when querying (milliseconds)
    #[serde(rename = "query-offset-ms", default = "default_query_offset")]
    pub query_offset_ms: i64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the JSON checkpoint / final archive
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,
}

fn default_fragment_count() -> usize {
    DEFAULT_FRAGMENT_COUNT
}

fn default_request_timeout() -> u64 {
    30
}

fn default_query_offset() -> i64 {
    1
}
