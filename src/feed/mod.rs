//! Monitoring feed abstraction.
//!
//! A [`Feed`] delivers raw node status records produced by a background
//! task. Two producers exist:
//!
//! - [`StatusRequester`]: the SensorBee HTTP query API (multipart stream)
//! - [`Feed::spawn_lines`]: newline-delimited JSON from any async reader,
//!   e.g. a TCP relay
//!
//! Records stay undecoded JSON values here; decoding belongs to the
//! aggregator so that decode failures follow one policy.

mod record;
mod sensorbee;
mod stream;

pub use record::{
    InputPipeStatus, InputStats, NodeCategory, NodeStatus, OutputPipeStatus, OutputStats,
    PipeStatus,
};
pub use sensorbee::{MultipartDecoder, StatusRequester};

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::IotopError;

/// Number of records buffered between the producer task and ingest.
const FEED_BUFFER: usize = 64;

/// One item received from the feed.
pub type FeedEvent = Result<serde_json::Value, IotopError>;

/// Receiving end of a monitoring feed.
#[derive(Debug)]
pub struct Feed {
    receiver: mpsc::Receiver<FeedEvent>,
    description: String,
}

impl Feed {
    /// Wrap an existing channel, e.g. for tests or custom producers.
    pub fn new(receiver: mpsc::Receiver<FeedEvent>, description: String) -> Self {
        Self {
            receiver,
            description,
        }
    }

    /// Connect to a TCP endpoint serving newline-delimited records.
    pub async fn connect(addr: &str) -> Result<Self, IotopError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| IotopError::Feed(format!("failed to connect to {}, {}", addr, e)))?;
        Ok(Self::spawn_lines(stream, addr))
    }

    /// Wait for the next record.
    ///
    /// Returns `None` once the producer has finished.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.receiver.recv().await
    }

    /// Returns a human-readable description of the feed.
    pub fn description(&self) -> &str {
        &self.description
    }
}
