//! Integration tests for the archiver
//!
//! These tests drive whole runs against a JSON checkpoint in a temporary
//! directory, using scripted fetchers or a wiremock GraphQL server.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use frame_archiver::archiver::{run_archive, Coordinator, FrameFetcher, GraphqlFrameFetcher};
use frame_archiver::config::{Config, FetcherConfig, OutputConfig, SchedulerConfig, WindowConfig};
use frame_archiver::storage::{CheckpointStore, JsonCheckpointStore};
use frame_archiver::{ArchiverError, FetchError, Fragments, Record};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration covering `[0, end_ms)` every 15 seconds
fn create_test_config(end_ms: i64, checkpoint_path: &Path) -> Config {
    Config {
        window: WindowConfig {
            start: Utc.timestamp_millis_opt(0).unwrap(),
            end: Utc.timestamp_millis_opt(end_ms).unwrap(),
            step_ms: 15_000,
        },
        scheduler: SchedulerConfig {
            max_concurrency: 4,
            retry_limit_per_task: 3,
            error_abort_threshold: 20,
            checkpoint_cadence: 100,
            transient_retry_delay_ms: 10,
            fragment_count: 6,
        },
        fetcher: FetcherConfig {
            endpoint: "http://127.0.0.1:1/query".to_string(),
            auth_token_path: "auth-token.txt".to_string(),
            user_agent: "TestAgent".to_string(),
            referer: None,
            proxy: None,
            request_timeout_secs: 5,
            query_offset_ms: 1,
        },
        output: OutputConfig {
            checkpoint_path: checkpoint_path.to_string_lossy().into_owned(),
        },
    }
}

fn record(timestamp: i64) -> Record {
    let mut fragments = Fragments::with_count(6);
    fragments
        .set(0, format!("https://img.example.com/{}-0.png", timestamp))
        .unwrap();
    Record::new(timestamp, fragments)
}

fn timestamps(records: &[Record]) -> Vec<i64> {
    records.iter().map(|r| r.timestamp).collect()
}

/// Scripted fetcher: fails listed timestamps with a validation error,
/// succeeds otherwise, and tracks call counts and overlap
#[derive(Default)]
struct ScriptedFetcher {
    invalid: Vec<i64>,
    delay: Duration,
    calls: Mutex<HashMap<i64, usize>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedFetcher {
    fn calls_for(&self, timestamp: i64) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&timestamp)
            .copied()
            .unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl FrameFetcher for ScriptedFetcher {
    async fn fetch(&self, timestamp: i64, cancel: CancellationToken) -> Result<Record, FetchError> {
        *self.calls.lock().unwrap().entry(timestamp).or_insert(0) += 1;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {
                if self.invalid.contains(&timestamp) {
                    Err(FetchError::Validation("Invalid response".to_string()))
                } else {
                    Ok(record(timestamp))
                }
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn test_full_run_writes_sorted_artifact() {
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("frames.json");
    let config = create_test_config(150_000, &checkpoint);
    let fetcher = Arc::new(ScriptedFetcher {
        delay: Duration::from_millis(5),
        ..Default::default()
    });

    let store = JsonCheckpointStore::new(&checkpoint, 6);
    let mut coordinator =
        Coordinator::with_components(&config, Box::new(store), fetcher.clone(), false)
            .expect("Failed to create coordinator");
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.fetched, 10);
    assert_eq!(report.total_records, 10);
    assert!(report.abandoned.is_empty());
    assert_eq!(fetcher.total_calls(), 10);

    let saved = JsonCheckpointStore::new(&checkpoint, 6)
        .load()
        .unwrap()
        .expect("Artifact missing");
    let expected: Vec<i64> = (0..10).map(|i| i * 15_000).collect();
    assert_eq!(timestamps(&saved), expected);

    let raw = std::fs::read_to_string(&checkpoint).unwrap();
    assert!(raw.starts_with("[\n\t{\"timestamp\":0,"));
    assert!(raw.ends_with("\n]\n"));
    assert_eq!(raw.lines().count(), 12);
}

#[tokio::test]
async fn test_resume_fetches_only_missing_timestamps() {
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("frames.json");
    let config = create_test_config(60_000, &checkpoint);

    let store = JsonCheckpointStore::new(&checkpoint, 6);
    store.save(&[record(0), record(30_000)]).unwrap();

    let fetcher = Arc::new(ScriptedFetcher::default());
    let mut coordinator =
        Coordinator::with_components(&config, Box::new(store), fetcher.clone(), false).unwrap();
    assert_eq!(coordinator.pending(), 2);
    assert_eq!(coordinator.record_count(), 2);

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.total_records, 4);
    assert_eq!(fetcher.calls_for(0), 0);
    assert_eq!(fetcher.calls_for(30_000), 0);
    assert_eq!(fetcher.calls_for(15_000), 1);
    assert_eq!(fetcher.calls_for(45_000), 1);

    let saved = JsonCheckpointStore::new(&checkpoint, 6).load().unwrap().unwrap();
    assert_eq!(timestamps(&saved), vec![0, 15_000, 30_000, 45_000]);
}

#[tokio::test]
async fn test_fresh_run_ignores_checkpoint() {
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("frames.json");
    let config = create_test_config(60_000, &checkpoint);

    let store = JsonCheckpointStore::new(&checkpoint, 6);
    store.save(&[record(0), record(30_000)]).unwrap();

    let fetcher = Arc::new(ScriptedFetcher::default());
    let mut coordinator =
        Coordinator::with_components(&config, Box::new(store), fetcher.clone(), true).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.fetched, 4);
    assert_eq!(fetcher.calls_for(0), 1);
}

#[tokio::test]
async fn test_invalid_timestamp_is_abandoned_after_retry_limit() {
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("frames.json");
    let config = create_test_config(60_000, &checkpoint);
    let fetcher = Arc::new(ScriptedFetcher {
        invalid: vec![15_000],
        ..Default::default()
    });

    let store = JsonCheckpointStore::new(&checkpoint, 6);
    let mut coordinator =
        Coordinator::with_components(&config, Box::new(store), fetcher.clone(), false).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(fetcher.calls_for(15_000), 3);
    assert_eq!(report.abandoned, vec![15_000]);
    assert_eq!(report.validation_errors, 3);
    assert_eq!(report.fetched, 3);

    let saved = JsonCheckpointStore::new(&checkpoint, 6).load().unwrap().unwrap();
    assert_eq!(timestamps(&saved), vec![0, 30_000, 45_000]);
}

#[tokio::test]
async fn test_repeated_failures_abandon_task_once() {
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("frames.json");
    let mut config = create_test_config(60_000, &checkpoint);
    config.scheduler.retry_limit_per_task = 5;
    config.scheduler.max_concurrency = 1;
    let fetcher = Arc::new(ScriptedFetcher {
        invalid: vec![30_000],
        ..Default::default()
    });

    let store = JsonCheckpointStore::new(&checkpoint, 6);
    let mut coordinator =
        Coordinator::with_components(&config, Box::new(store), fetcher.clone(), false).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(fetcher.calls_for(30_000), 5);
    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.abandoned, vec![30_000]);
    assert_eq!(report.validation_errors, 5);
    assert_eq!(report.total_records, 3);
}

#[tokio::test]
async fn test_error_budget_aborts_run() {
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("frames.json");
    let mut config = create_test_config(150_000, &checkpoint);
    config.scheduler.max_concurrency = 1;
    config.scheduler.error_abort_threshold = 2;
    let fetcher = Arc::new(ScriptedFetcher {
        invalid: (0..10).map(|i| i * 15_000).collect(),
        ..Default::default()
    });

    let store = JsonCheckpointStore::new(&checkpoint, 6);
    let mut coordinator =
        Coordinator::with_components(&config, Box::new(store), fetcher.clone(), false).unwrap();
    let result = coordinator.run().await;

    assert!(matches!(
        result,
        Err(ArchiverError::RunAborted {
            error_count: 2,
            records: 0
        })
    ));
    // No dispatch after the budget ran out
    assert_eq!(fetcher.total_calls(), 2);

    // The artifact is still written and loadable
    let saved = JsonCheckpointStore::new(&checkpoint, 6).load().unwrap();
    assert_eq!(saved, Some(vec![]));
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("frames.json");
    let mut config = create_test_config(300_000, &checkpoint);
    config.scheduler.max_concurrency = 3;
    let fetcher = Arc::new(ScriptedFetcher {
        delay: Duration::from_millis(10),
        ..Default::default()
    });

    let store = JsonCheckpointStore::new(&checkpoint, 6);
    let mut coordinator =
        Coordinator::with_components(&config, Box::new(store), fetcher.clone(), false).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.fetched, 20);
    assert!(report.peak_in_flight <= 3);
    assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
    assert!(fetcher.peak.load(Ordering::SeqCst) >= 2);
}

/// Builds a GraphQL response body carrying `frames`
fn frame_history_response(frames: serde_json::Value) -> serde_json::Value {
    json!({
        "data": { "act": { "data": [
            {
                "id": "7c1a3f0e",
                "data": { "frames": frames, "__typename": "GetFrameHistoryResponseMessageData" },
                "__typename": "BasicMessage"
            }
        ], "__typename": "ActPayload" } }
    })
}

fn graphql_fetcher(server: &MockServer) -> GraphqlFrameFetcher {
    let mut config = create_test_config(60_000, Path::new("unused.json"));
    config.fetcher.endpoint = format!("{}/query", server.uri());
    GraphqlFrameFetcher::with_token(&config.fetcher, "test-token".to_string(), 6)
        .expect("Failed to build fetcher")
}

#[tokio::test]
async fn test_graphql_fetch_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "operationName": "frameHistory",
            "variables": { "input": { "GetFrameHistoryMessageData": { "timestamp": 14_999 } } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(frame_history_response(json!([
            { "canvasIndex": 0, "url": "https://img.example.com/a.png", "__typename": "Frame" },
            { "canvasIndex": 3, "url": "https://img.example.com/b.png", "__typename": "Frame" }
        ]))))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = graphql_fetcher(&mock_server);
    let record = fetcher
        .fetch(15_000, CancellationToken::new())
        .await
        .expect("Fetch failed");

    assert_eq!(record.timestamp, 15_000);
    assert_eq!(record.fragments.len(), 6);
    assert_eq!(record.fragments.get(0), Some("https://img.example.com/a.png"));
    assert_eq!(record.fragments.get(3), Some("https://img.example.com/b.png"));
    assert_eq!(record.fragments.get(1), None);
}

#[tokio::test]
async fn test_graphql_out_of_range_index_is_validation_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(frame_history_response(json!([
            { "canvasIndex": 9, "url": "https://img.example.com/x.png" }
        ]))))
        .mount(&mock_server)
        .await;

    let result = graphql_fetcher(&mock_server)
        .fetch(0, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(FetchError::Validation(_))));
}

#[tokio::test]
async fn test_graphql_server_error_is_validation_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream failure"))
        .mount(&mock_server)
        .await;

    let result = graphql_fetcher(&mock_server)
        .fetch(0, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(FetchError::Validation(m)) if m.contains("500")));
}

#[tokio::test]
async fn test_graphql_non_json_body_is_validation_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    let result = graphql_fetcher(&mock_server)
        .fetch(0, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(FetchError::Validation(m)) if m.starts_with("Invalid response")));
}

#[tokio::test]
async fn test_run_archive_end_to_end() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(frame_history_response(json!([
            { "canvasIndex": 5, "url": "https://img.example.com/f.png" }
        ]))))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("frames.json");
    let token_path = dir.path().join("auth-token.txt");
    std::fs::write(&token_path, "test-token\n").unwrap();

    let mut config = create_test_config(60_000, &checkpoint);
    config.fetcher.endpoint = format!("{}/query", mock_server.uri());
    config.fetcher.auth_token_path = token_path.to_string_lossy().into_owned();

    let report = run_archive(config, false).await.expect("Run failed");

    assert_eq!(report.fetched, 4);
    let saved = JsonCheckpointStore::new(&checkpoint, 6).load().unwrap().unwrap();
    assert_eq!(timestamps(&saved), vec![0, 15_000, 30_000, 45_000]);
    assert!(saved
        .iter()
        .all(|r| r.fragments.get(5) == Some("https://img.example.com/f.png")));
}

#[tokio::test]
async fn test_missing_auth_token_fails_before_fetching() {
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("frames.json");
    let mut config = create_test_config(60_000, &checkpoint);
    config.fetcher.auth_token_path = dir
        .path()
        .join("missing-token.txt")
        .to_string_lossy()
        .into_owned();

    let result = run_archive(config, false).await;

    assert!(matches!(result, Err(ArchiverError::AuthToken { .. })));
    assert!(!checkpoint.exists());
}
