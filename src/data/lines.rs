//! Per-category rows of a snapshot.
//!
//! Each node category has its own row type carrying only the counters that
//! make sense for it. Every row has one primary counter which is the value
//! converted to a rate in rate mode.

use crate::feed::NodeStatus;

/// A source node: emits tuples only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub name: String,
    pub state: String,
    pub out: i64,
    pub dropped: i64,
}

/// A box node: receives and emits tuples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxLine {
    pub name: String,
    pub state: String,
    /// Sent total minus received total.
    pub in_out: i64,
    pub dropped: i64,
    pub errors: i64,
}

/// A sink node: receives tuples only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkLine {
    pub name: String,
    pub state: String,
    pub received: i64,
    pub errors: i64,
}

impl From<&NodeStatus> for SourceLine {
    fn from(status: &NodeStatus) -> Self {
        Self {
            name: status.node_name.clone(),
            state: status.state.clone(),
            out: status.output_stats.num_sent_total,
            dropped: status.output_stats.num_dropped,
        }
    }
}

impl From<&NodeStatus> for BoxLine {
    fn from(status: &NodeStatus) -> Self {
        Self {
            name: status.node_name.clone(),
            state: status.state.clone(),
            in_out: status.output_stats.num_sent_total - status.input_stats.num_received_total,
            dropped: status.output_stats.num_dropped,
            errors: status.input_stats.num_errors,
        }
    }
}

impl From<&NodeStatus> for SinkLine {
    fn from(status: &NodeStatus) -> Self {
        Self {
            name: status.node_name.clone(),
            state: status.state.clone(),
            received: status.input_stats.num_received_total,
            errors: status.input_stats.num_errors,
        }
    }
}
