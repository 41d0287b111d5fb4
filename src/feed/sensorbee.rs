//! SensorBee HTTP query feed.
//!
//! Node statuses are obtained by creating a `node_statuses` source in the
//! target topology and streaming a `SELECT` over it. The server answers the
//! select with a `multipart/mixed` response whose parts are single JSON
//! records.

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{Feed, FeedEvent, FEED_BUFFER};
use crate::error::IotopError;

/// Name of the temporary source created in the monitored topology.
const STATUS_SOURCE: &str = "iotop_ns";

/// Issues BQL statements against one topology.
#[derive(Debug, Clone)]
pub struct StatusRequester {
    client: reqwest::Client,
    queries_url: String,
}

impl StatusRequester {
    /// Create a requester for `{uri}api/{api_version}/topologies/{topology}/queries`.
    pub fn new(uri: &str, api_version: &str, topology: &str) -> Self {
        let queries_url = format!(
            "{}/api/{}/topologies/{}/queries",
            uri.trim_end_matches('/'),
            api_version,
            topology
        );
        Self {
            client: reqwest::Client::new(),
            queries_url,
        }
    }

    /// Returns the endpoint statements are posted to.
    pub fn queries_url(&self) -> &str {
        &self.queries_url
    }

    async fn post_query(&self, bql: &str) -> Result<Response, IotopError> {
        debug!(bql, "posting query");
        let res = self
            .client
            .post(&self.queries_url)
            .json(&serde_json::json!({ "queries": bql }))
            .send()
            .await?;
        check_response(res).await
    }

    /// Create the `node_statuses` source emitting every `interval` seconds.
    pub async fn setup(&self, interval: f64) -> Result<(), IotopError> {
        let bql = format!(
            "CREATE SOURCE {} TYPE node_statuses WITH interval = {:.6};",
            STATUS_SOURCE, interval
        );
        self.post_query(&bql).await.map_err(|e| {
            IotopError::Feed(format!("request failed to create 'node_statuses' source, {}", e))
        })?;
        info!(url = %self.queries_url, interval, "created node status source");
        Ok(())
    }

    /// Start streaming node statuses.
    pub async fn select(&self) -> Result<Feed, IotopError> {
        let bql = format!("SELECT RSTREAM *, ts() FROM {} [RANGE 1 TUPLES];", STATUS_SOURCE);
        let res = self.post_query(&bql).await.map_err(|e| {
            IotopError::Feed(format!("request failed to stream 'node_statuses', {}", e))
        })?;

        let decoder = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(MultipartDecoder::from_content_type)
            .ok_or_else(|| IotopError::Feed("failed to stream 'SELECT' query".to_string()))?;

        Ok(Feed::spawn_multipart(res, decoder, &self.queries_url))
    }

    /// Drop the `node_statuses` source.
    pub async fn teardown(&self) -> Result<(), IotopError> {
        self.post_query(&format!("DROP SOURCE {};", STATUS_SOURCE)).await?;
        info!("dropped node status source");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(default)]
    request_id: Option<serde_json::Value>,
}

async fn check_response(res: Response) -> Result<Response, IotopError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(IotopError::Feed(describe_error(status, &body)))
}

fn describe_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => match error.request_id {
            Some(id) => format!("{}: {} (request {})", error.code, error.message, id),
            None => format!("{}: {}", error.code, error.message),
        },
        Err(_) => format!("server responded with {}", status),
    }
}

impl Feed {
    /// Spawn a background task that splits a multipart response into records.
    pub fn spawn_multipart(res: Response, mut decoder: MultipartDecoder, description: &str) -> Self {
        let (tx, rx) = mpsc::channel::<FeedEvent>(FEED_BUFFER);

        tokio::spawn(async move {
            let mut body = res.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                };
                for part in decoder.feed(&chunk) {
                    let event = serde_json::from_slice(&part).map_err(IotopError::from);
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                if decoder.is_finished() {
                    break;
                }
            }
            debug!("multipart feed finished");
        });

        Self::new(rx, format!("sensorbee: {}", description))
    }
}

/// Incremental splitter for `multipart/mixed` bodies.
///
/// Chunks may cut parts and delimiters anywhere; incomplete data is buffered
/// until the following delimiter arrives.
#[derive(Debug)]
pub struct MultipartDecoder {
    delimiter: Vec<u8>,
    buf: Vec<u8>,
    finished: bool,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Self {
        Self {
            delimiter: format!("--{}", boundary).into_bytes(),
            buf: Vec::new(),
            finished: false,
        }
    }

    /// Build a decoder from a `Content-Type` header value.
    ///
    /// Returns `None` unless the value is `multipart/mixed` with a boundary.
    pub fn from_content_type(value: &str) -> Option<Self> {
        let mut params = value.split(';');
        let mime = params.next()?.trim();
        if !mime.eq_ignore_ascii_case("multipart/mixed") {
            return None;
        }
        params
            .filter_map(|p| p.trim().strip_prefix("boundary="))
            .map(|b| b.trim_matches('"'))
            .find(|b| !b.is_empty())
            .map(Self::new)
    }

    /// True once the closing delimiter has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Append a chunk and return the bodies of every part it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut bodies = Vec::new();

        while !self.finished {
            let Some(start) = find(&self.buf, &self.delimiter, 0) else {
                break;
            };
            let after = start + self.delimiter.len();
            if self.buf.len() < after + 2 {
                break;
            }
            if self.buf[after..].starts_with(b"--") {
                self.finished = true;
                self.buf.clear();
                break;
            }
            let Some(end) = find(&self.buf, &self.delimiter, after) else {
                break;
            };
            if let Some(body) = part_body(&self.buf[after..end]) {
                bodies.push(body.to_vec());
            }
            self.buf.drain(..end);
        }

        bodies
    }
}

/// Strip the delimiter line remainder and part headers.
fn part_body(part: &[u8]) -> Option<&[u8]> {
    let line_end = find(part, b"\n", 0)?;
    let rest = &part[line_end + 1..];
    let body = if let Some(body) = rest.strip_prefix(b"\r\n") {
        body
    } else if let Some(body) = rest.strip_prefix(b"\n") {
        body
    } else {
        let headers_end = find(rest, b"\r\n\r\n", 0)
            .map(|i| i + 4)
            .or_else(|| find(rest, b"\n\n", 0).map(|i| i + 2))?;
        &rest[headers_end..]
    };
    let body = body.trim_ascii();
    (!body.is_empty()).then_some(body)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|i| i + from)
}
