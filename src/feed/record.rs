//! Wire types for node status records.
//!
//! These types match the tuples emitted by SensorBee's `node_statuses`
//! source when selected together with `ts()`. Each record describes one
//! node at one logical timestamp.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// The kind of node a status record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Source,
    Box,
    Sink,
}

impl NodeCategory {
    /// Returns the wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeCategory::Source => "source",
            NodeCategory::Box => "box",
            NodeCategory::Sink => "sink",
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single node status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_name: String,
    pub node_type: NodeCategory,

    /// Lifecycle state reported by the server (e.g. "running", "stopped").
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,

    /// Absent for sinks.
    #[serde(default, deserialize_with = "null_as_default")]
    pub output_stats: OutputStats,

    /// Absent for sources.
    #[serde(default, deserialize_with = "null_as_default")]
    pub input_stats: InputStats,

    /// Logical timestamp shared by every record of one snapshot.
    pub ts: serde_json::Value,
}

/// Outbound counters of a source or box.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputStats {
    #[serde(default, deserialize_with = "null_as_default")]
    pub num_sent_total: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub num_dropped: i64,
    /// Pipe status keyed by receiver name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub outputs: BTreeMap<String, OutputPipeStatus>,
}

/// Inbound counters of a box or sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputStats {
    #[serde(default, deserialize_with = "null_as_default")]
    pub num_received_total: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub num_errors: i64,
    /// Pipe status keyed by sender name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub inputs: BTreeMap<String, InputPipeStatus>,
}

/// Sender-side view of a pipe.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OutputPipeStatus {
    pub num_queued: i64,
    pub num_sent: i64,
    pub queue_size: i64,
}

/// Receiver-side view of a pipe.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InputPipeStatus {
    pub num_queued: i64,
    pub num_received: i64,
    pub queue_size: i64,
}

/// One side of a pipe, independent of direction.
///
/// `count` is the cumulative number of tuples sent (sender side) or
/// received (receiver side).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeStatus {
    pub queued: i64,
    pub queue_size: i64,
    pub count: i64,
}

impl From<OutputPipeStatus> for PipeStatus {
    fn from(pipe: OutputPipeStatus) -> Self {
        Self {
            queued: pipe.num_queued,
            queue_size: pipe.queue_size,
            count: pipe.num_sent,
        }
    }
}

impl From<InputPipeStatus> for PipeStatus {
    fn from(pipe: InputPipeStatus) -> Self {
        Self {
            queued: pipe.num_queued,
            queue_size: pipe.queue_size,
            count: pipe.num_received,
        }
    }
}
