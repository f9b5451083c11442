//! Frame fetcher implementation
//!
//! This module handles all requests to the remote frame source, including:
//! - The `FrameFetcher` contract the pool drives
//! - Building the HTTP client with proxy, timeout and headers
//! - Issuing the `frameHistory` GraphQL mutation for one timestamp
//! - Decoding the response into a fixed-length fragment list
//! - Error classification (transient vs. validation)

use crate::config::FetcherConfig;
use crate::state::{format_timestamp, Fragments, Record};
use crate::{ArchiverError, FetchError};
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retrieves the record for one timestamp
///
/// Implementations must not mutate shared state and should stop their own
/// I/O promptly once `cancel` is signaled.
#[async_trait]
pub trait FrameFetcher: Send + Sync {
    /// Fetches the frame at `timestamp`
    ///
    /// # Returns
    ///
    /// * `Ok(Record)` - The frame and its fragments
    /// * `Err(FetchError::Transient)` - Network or timeout failure
    /// * `Err(FetchError::Validation)` - Response present but unusable
    /// * `Err(FetchError::Cancelled)` - `cancel` was already signaled
    async fn fetch(&self, timestamp: i64, cancel: CancellationToken) -> Result<Record, FetchError>;
}

const FRAME_HISTORY_QUERY: &str = "mutation frameHistory($input: ActInput!) {\nact(input: $input) {\ndata {\n... on BasicMessage {\nid\ndata {\n... on GetFrameHistoryResponseMessageData {\nframes {\ncanvasIndex\nurl\n__typename\n}\n__typename\n}\n__typename\n}\n__typename\n}\n__typename\n}\n__typename\n}\n}";

/// Fetches frames through the `frameHistory` GraphQL mutation
pub struct GraphqlFrameFetcher {
    client: Client,
    endpoint: String,
    auth_token: String,
    referer: Option<String>,
    query_offset_ms: i64,
    fragment_count: usize,
}

impl GraphqlFrameFetcher {
    /// Creates a fetcher, reading the bearer token from `auth-token-path`
    ///
    /// # Arguments
    ///
    /// * `config` - The fetcher configuration
    /// * `fragment_count` - Number of fragment slots per record
    pub fn new(config: &FetcherConfig, fragment_count: usize) -> Result<Self, ArchiverError> {
        let auth_token = std::fs::read_to_string(&config.auth_token_path)
            .map_err(|source| ArchiverError::AuthToken {
                path: config.auth_token_path.clone(),
                source,
            })?
            .trim()
            .to_string();

        Self::with_token(config, auth_token, fragment_count)
    }

    /// Creates a fetcher with an explicit bearer token
    pub fn with_token(
        config: &FetcherConfig,
        auth_token: String,
        fragment_count: usize,
    ) -> Result<Self, ArchiverError> {
        let client = build_http_client(config)?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            auth_token,
            referer: config.referer.clone(),
            query_offset_ms: config.query_offset_ms,
            fragment_count,
        })
    }

    async fn request(&self, timestamp: i64) -> Result<Record, FetchError> {
        let body = frame_history_body(timestamp - self.query_offset_ms);

        let mut request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.auth_token)
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-site")
            .json(&body);
        if let Some(referer) = &self.referer {
            request = request.header(header::REFERER, referer);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            tracing::debug!("Response body: {}", text);
            return Err(FetchError::Validation(format!(
                "Request failed with HTTP {}",
                status.as_u16()
            )));
        }

        let parsed: FrameHistoryResponse = serde_json::from_str(&text).map_err(|e| {
            tracing::debug!("Response body: {}", text);
            FetchError::Validation(format!("Invalid response: {}", e))
        })?;

        let fragments = decode_fragments(&parsed, self.fragment_count).map_err(|e| {
            tracing::debug!("Response body: {}", text);
            e
        })?;

        Ok(Record::new(timestamp, fragments))
    }
}

#[async_trait]
impl FrameFetcher for GraphqlFrameFetcher {
    async fn fetch(&self, timestamp: i64, cancel: CancellationToken) -> Result<Record, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = self.request(timestamp) => result,
        };

        if let Err(e) = &result {
            tracing::warn!("For {}: {}", format_timestamp(timestamp), e);
        }
        result
    }
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are refused outright; a redirect from the API is treated as a
/// failed request rather than followed.
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
    }

    builder.build()
}

/// Builds the GraphQL request body for `query_timestamp`
pub fn frame_history_body(query_timestamp: i64) -> serde_json::Value {
    json!({
        "operationName": "frameHistory",
        "variables": {
            "input": {
                "actionName": "get_frame_history",
                "GetFrameHistoryMessageData": { "timestamp": query_timestamp }
            }
        },
        "query": FRAME_HISTORY_QUERY
    })
}

fn classify_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Transient("Request timeout".to_string())
    } else if e.is_connect() {
        FetchError::Transient(format!("Connection failed: {}", e))
    } else if e.is_redirect() || e.is_builder() {
        FetchError::Validation(e.to_string())
    } else {
        FetchError::Transient(e.to_string())
    }
}

/// GraphQL response envelope; every level is optional so gaps become validation errors
#[derive(Debug, Deserialize)]
pub struct FrameHistoryResponse {
    data: Option<ActData>,
}

#[derive(Debug, Deserialize)]
struct ActData {
    act: Option<Act>,
}

#[derive(Debug, Deserialize)]
struct Act {
    data: Option<Vec<Option<BasicMessage>>>,
}

#[derive(Debug, Deserialize)]
struct BasicMessage {
    id: Option<serde_json::Value>,
    data: Option<FrameHistory>,
}

#[derive(Debug, Deserialize)]
struct FrameHistory {
    frames: Option<Vec<Option<FrameRef>>>,
}

#[derive(Debug, Deserialize)]
struct FrameRef {
    #[serde(rename = "canvasIndex")]
    canvas_index: Option<i64>,
    url: Option<String>,
}

/// Extracts fragment URLs from a decoded response
///
/// # Errors
///
/// `FetchError::Validation` when the message or frame list is missing, a
/// frame lacks its index or URL, or an index is out of range or repeated.
pub fn decode_fragments(
    response: &FrameHistoryResponse,
    fragment_count: usize,
) -> Result<Fragments, FetchError> {
    let message = response
        .data
        .as_ref()
        .and_then(|d| d.act.as_ref())
        .and_then(|a| a.data.as_ref())
        .and_then(|messages| messages.first())
        .and_then(|m| m.as_ref());

    let (message, frames) = match message.and_then(|m| m.data.as_ref().map(|d| (m, d))) {
        Some((message, FrameHistory { frames: Some(frames) })) => (message, frames),
        _ => return Err(FetchError::Validation("Invalid response".to_string())),
    };

    if message.id.is_none() {
        tracing::warn!("Bad UUID.");
    }

    let mut fragments = Fragments::with_count(fragment_count);
    for frame in frames {
        match frame {
            Some(FrameRef {
                canvas_index: Some(index),
                url: Some(url),
            }) => fragments.set(*index, url.clone())?,
            _ => {
                return Err(FetchError::Validation(
                    "Invalid fragment data".to_string(),
                ))
            }
        }
    }

    Ok(fragments)
}
