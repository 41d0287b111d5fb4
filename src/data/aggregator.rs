//! Snapshot aggregation and rendering.
//!
//! Records arrive one node at a time. All records of one snapshot share a
//! logical timestamp; the first record carrying a new timestamp closes the
//! current snapshot, which becomes the baseline for rate computation.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use super::edge::{Edge, EdgeCorrelator, EdgeKey};
use super::lines::{BoxLine, SinkLine, SourceLine};
use super::state::MonitoringState;
use super::table::TextTable;
use crate::error::IotopError;
use crate::feed::{NodeCategory, NodeStatus, PipeStatus};

const EDGE_HEADER: [&str; 11] = [
    "SENDER", "STYPE", "RCVER", "RTYPE", "SQSIZE", "SQNUM", "SNUM", "RQSIZE", "RQNUM", "RNUM",
    "INOUT",
];
const SOURCE_HEADER: [&str; 5] = ["NAME", "NTYPE", "STATE", "OUT", "DROP"];
const BOX_HEADER: [&str; 6] = ["NAME", "NTYPE", "STATE", "INOUT", "DROP", "ERR"];
const SINK_HEADER: [&str; 5] = ["NAME", "NTYPE", "STATE", "IN", "ERR"];

/// Shown for the half of an edge that has not reported yet.
const PLACEHOLDER: &str = "-";

/// Every reading sharing one logical timestamp.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// `None` only before the first record.
    pub timestamp: Option<serde_json::Value>,
    pub sources: BTreeMap<String, SourceLine>,
    pub boxes: BTreeMap<String, BoxLine>,
    pub sinks: BTreeMap<String, SinkLine>,
    pub edges: EdgeCorrelator,
}

impl Snapshot {
    fn opened_at(timestamp: serde_json::Value) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..Self::default()
        }
    }

    fn apply(&mut self, status: &NodeStatus) {
        let name = status.node_name.as_str();
        let category = status.node_type;
        let outputs = status
            .output_stats
            .outputs
            .iter()
            .map(|(peer, pipe)| (peer.as_str(), PipeStatus::from(*pipe)));
        let inputs = status
            .input_stats
            .inputs
            .iter()
            .map(|(peer, pipe)| (peer.as_str(), PipeStatus::from(*pipe)));

        match category {
            NodeCategory::Source => {
                self.sources.insert(name.to_string(), SourceLine::from(status));
                self.edges.set_source_side(name, category, outputs);
            }
            NodeCategory::Box => {
                self.boxes.insert(name.to_string(), BoxLine::from(status));
                self.edges.set_source_side(name, category, outputs);
                self.edges.set_destination_side(name, category, inputs);
            }
            NodeCategory::Sink => {
                self.sinks.insert(name.to_string(), SinkLine::from(status));
                self.edges.set_destination_side(name, category, inputs);
            }
        }
    }

    /// Number of node rows across all categories.
    pub fn node_count(&self) -> usize {
        self.sources.len() + self.boxes.len() + self.sinks.len()
    }
}

#[derive(Debug, Default)]
struct Snapshots {
    current: Snapshot,
    previous: Snapshot,
}

/// Double-buffered snapshot store.
///
/// Writers (ingest) and readers (render) may run on different tasks; the
/// pair of snapshots is guarded by one lock so a reader never observes a
/// half-rotated state.
#[derive(Debug, Default)]
pub struct SnapshotAggregator {
    snapshots: RwLock<Snapshots>,
}

impl SnapshotAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and apply one raw record.
    pub fn push(&self, record: serde_json::Value) -> Result<(), IotopError> {
        let status: NodeStatus = serde_json::from_value(record)?;
        self.push_status(&status);
        Ok(())
    }

    /// Apply one decoded record, rotating snapshots on a new timestamp.
    pub fn push_status(&self, status: &NodeStatus) {
        let mut snapshots = self.snapshots.write();
        if snapshots.current.timestamp.as_ref() != Some(&status.ts) {
            let closed = std::mem::replace(
                &mut snapshots.current,
                Snapshot::opened_at(status.ts.clone()),
            );
            debug!(
                nodes = closed.node_count(),
                edges = closed.edges.len(),
                ts = %status.ts,
                "snapshot rotated"
            );
            snapshots.previous = closed;
        }
        snapshots.current.apply(status);
    }

    /// Returns a copy of the open snapshot.
    pub fn current(&self) -> Snapshot {
        self.snapshots.read().current.clone()
    }

    /// Returns a copy of the last closed snapshot.
    pub fn previous(&self) -> Snapshot {
        self.snapshots.read().previous.clone()
    }

    /// Render the visible tables as aligned text.
    pub fn flush(&self, state: &MonitoringState) -> String {
        let snapshots = self.snapshots.read();
        let current = &snapshots.current;
        let previous = &snapshots.previous;
        let visibility = state.visibility;

        let mut tables = Vec::with_capacity(4);
        if visibility.edges {
            tables.push(edge_table(current, previous, state));
        }
        if visibility.sources {
            tables.push(source_table(current, previous, state));
        }
        if visibility.boxes {
            tables.push(box_table(current, previous, state));
        }
        if visibility.sinks {
            tables.push(sink_table(current, previous, state));
        }

        let mut out = String::new();
        for (i, table) in tables.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            table.render_into(&mut out);
        }
        out
    }
}

/// Format a primary counter: a rate when a baseline exists, else `[total]`.
fn counter_cell(current: i64, previous: Option<i64>, state: &MonitoringState) -> String {
    match previous {
        Some(prev) if state.is_rate() && !state.rate_period().is_zero() => {
            format!("{:.2}", (current - prev) as f64 / state.rate_period().as_secs_f64())
        }
        _ => format!("[{}]", current),
    }
}

fn edge_table(current: &Snapshot, previous: &Snapshot, state: &MonitoringState) -> TextTable {
    let mut table = TextTable::new(&EDGE_HEADER);
    for (key, edge) in current.edges.iter() {
        let prev = previous.edges.get_by_key(key).map(|e| e.backlog);
        table.push_row(edge_row(key, edge, counter_cell(edge.backlog, prev, state)));
    }
    table
}

fn edge_row(key: &EdgeKey, edge: &Edge, in_out: String) -> Vec<String> {
    let category = |side: Option<NodeCategory>| {
        side.map_or_else(|| PLACEHOLDER.to_string(), |c| c.to_string())
    };
    let pipe_cells = |pipe: Option<PipeStatus>| match pipe {
        Some(p) => [p.queue_size.to_string(), p.queued.to_string(), p.count.to_string()],
        None => [PLACEHOLDER.to_string(), PLACEHOLDER.to_string(), PLACEHOLDER.to_string()],
    };

    let mut row = vec![
        key.sender.clone(),
        category(edge.sender.map(|s| s.category)),
        key.receiver.clone(),
        category(edge.receiver.map(|s| s.category)),
    ];
    row.extend(pipe_cells(edge.sender.map(|s| s.pipe)));
    row.extend(pipe_cells(edge.receiver.map(|s| s.pipe)));
    row.push(in_out);
    row
}

fn source_table(current: &Snapshot, previous: &Snapshot, state: &MonitoringState) -> TextTable {
    let mut table = TextTable::new(&SOURCE_HEADER);
    for line in current.sources.values() {
        let prev = previous.sources.get(&line.name).map(|l| l.out);
        table.push_row(vec![
            line.name.clone(),
            NodeCategory::Source.to_string(),
            line.state.clone(),
            counter_cell(line.out, prev, state),
            line.dropped.to_string(),
        ]);
    }
    table
}

fn box_table(current: &Snapshot, previous: &Snapshot, state: &MonitoringState) -> TextTable {
    let mut table = TextTable::new(&BOX_HEADER);
    for line in current.boxes.values() {
        let prev = previous.boxes.get(&line.name).map(|l| l.in_out);
        table.push_row(vec![
            line.name.clone(),
            NodeCategory::Box.to_string(),
            line.state.clone(),
            counter_cell(line.in_out, prev, state),
            line.dropped.to_string(),
            line.errors.to_string(),
        ]);
    }
    table
}

fn sink_table(current: &Snapshot, previous: &Snapshot, state: &MonitoringState) -> TextTable {
    let mut table = TextTable::new(&SINK_HEADER);
    for line in current.sinks.values() {
        let prev = previous.sinks.get(&line.name).map(|l| l.received);
        table.push_row(vec![
            line.name.clone(),
            NodeCategory::Sink.to_string(),
            line.state.clone(),
            counter_cell(line.received, prev, state),
            line.errors.to_string(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::state::{DisplayMode, Visibility};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn source(name: &str, sent: i64, ts: i64) -> Value {
        json!({
            "node_name": name,
            "node_type": "source",
            "state": "running",
            "output_stats": {"num_sent_total": sent, "num_dropped": 0, "outputs": {}},
            "ts": ts
        })
    }

    fn rows_of<'a>(out: &'a str, names: &[&str]) -> Vec<&'a str> {
        out.lines()
            .filter(|l| names.iter().any(|n| l.starts_with(n)))
            .collect()
    }

    fn state(secs: u64) -> MonitoringState {
        MonitoringState::new(Duration::from_secs(secs))
    }

    #[test]
    fn test_same_timestamp_rows_sorted_by_name() {
        let agg = SnapshotAggregator::new();
        agg.push(source("zeta", 1, 1)).unwrap();
        agg.push(source("alpha", 2, 1)).unwrap();

        let current = agg.current();
        assert_eq!(current.sources.len(), 2);

        let out = agg.flush(&state(5));
        let rows = rows_of(&out, &["alpha", "zeta"]);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("alpha"));
        assert!(rows[1].starts_with("zeta"));
    }

    #[test]
    fn test_new_timestamp_rotates_snapshot() {
        let agg = SnapshotAggregator::new();
        agg.push(source("a", 1, 1)).unwrap();
        agg.push(source("b", 1, 1)).unwrap();
        agg.push(source("a", 5, 2)).unwrap();

        let current = agg.current();
        let previous = agg.previous();
        assert_eq!(current.timestamp, Some(json!(2)));
        assert_eq!(current.sources.len(), 1);
        assert_eq!(current.sources["a"].out, 5);
        assert_eq!(previous.timestamp, Some(json!(1)));
        assert_eq!(previous.sources.len(), 2);
    }

    #[test]
    fn test_rate_from_previous_snapshot() {
        let agg = SnapshotAggregator::new();
        agg.push(source("src", 100, 1)).unwrap();
        agg.push(source("src", 150, 2)).unwrap();

        let out = agg.flush(&state(5));
        let row = rows_of(&out, &["src"])[0];
        assert!(row.contains("10.00"), "row was {:?}", row);
        assert!(!row.contains('['));
    }

    #[test]
    fn test_rate_uses_sampling_period_after_interval_change() {
        let agg = SnapshotAggregator::new();
        agg.push(source("src", 100, 1)).unwrap();
        agg.push(source("src", 150, 2)).unwrap();

        let mut state = state(5).with_sample_period(Duration::from_secs(5));
        state.interval = Duration::from_secs(1);
        let out = agg.flush(&state);
        let row = rows_of(&out, &["src"])[0];
        assert!(row.contains("10.00"), "row was {:?}", row);
    }

    #[test]
    fn test_no_previous_entry_shows_bracketed_total() {
        let agg = SnapshotAggregator::new();
        agg.push(source("src", 100, 1)).unwrap();
        agg.push(source("src", 150, 2)).unwrap();
        agg.push(source("fresh", 42, 2)).unwrap();

        let out = agg.flush(&state(5));
        assert!(rows_of(&out, &["fresh"])[0].contains("[42]"));
    }

    #[test]
    fn test_absolute_mode_shows_bracketed_total() {
        let agg = SnapshotAggregator::new();
        agg.push(source("src", 100, 1)).unwrap();
        agg.push(source("src", 150, 2)).unwrap();

        let mut st = state(5);
        st.mode = DisplayMode::Absolute;
        let out = agg.flush(&st);
        assert!(rows_of(&out, &["src"])[0].contains("[150]"));
    }

    #[test]
    fn test_sender_and_receiver_records_merge() {
        let agg = SnapshotAggregator::new();
        agg.push(json!({
            "node_name": "src",
            "node_type": "source",
            "state": "running",
            "output_stats": {
                "num_sent_total": 10,
                "num_dropped": 0,
                "outputs": {"snk": {"num_queued": 1, "num_sent": 10, "queue_size": 1024}}
            },
            "ts": 1
        }))
        .unwrap();
        agg.push(json!({
            "node_name": "snk",
            "node_type": "sink",
            "state": "running",
            "input_stats": {
                "num_received_total": 7,
                "num_errors": 0,
                "inputs": {"src": {"num_queued": 2, "num_received": 7, "queue_size": 1024}}
            },
            "ts": 1
        }))
        .unwrap();

        let current = agg.current();
        assert_eq!(current.edges.len(), 1);
        let edge = current.edges.get("src", "snk").unwrap();
        assert_eq!(edge.sender.unwrap().pipe.count, 10);
        assert_eq!(edge.receiver.unwrap().pipe.count, 7);
        assert_eq!(edge.backlog, -3);

        let out = agg.flush(&state(1));
        let row = out.lines().find(|l| l.starts_with("src ") && l.contains("snk")).unwrap();
        let cells: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(cells, vec!["src", "source", "snk", "sink", "1024", "1", "10", "1024", "2", "7", "[-3]"]);
    }

    #[test]
    fn test_missing_side_uses_placeholder() {
        let agg = SnapshotAggregator::new();
        agg.push(json!({
            "node_name": "src",
            "node_type": "source",
            "output_stats": {"outputs": {"snk": {"num_queued": 0, "num_sent": 4, "queue_size": 8}}},
            "ts": 1
        }))
        .unwrap();

        let out = agg.flush(&state(1).with_visibility(Visibility::parse("edge").unwrap()));
        let row = out.lines().nth(1).unwrap();
        let cells: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(cells, vec!["src", "source", "snk", "-", "8", "0", "4", "-", "-", "-", "[0]"]);
    }

    #[test]
    fn test_filter_hides_edge_and_sink_tables() {
        let agg = SnapshotAggregator::new();
        agg.push(source("the-src", 1, 1)).unwrap();
        agg.push(json!({"node_name": "the-box", "node_type": "box", "ts": 1})).unwrap();
        agg.push(json!({"node_name": "the-sink", "node_type": "sink", "ts": 1})).unwrap();

        let visibility = Visibility::parse("src,box").unwrap();
        let out = agg.flush(&state(1).with_visibility(visibility));

        assert!(!out.contains("SENDER"));
        assert!(out.contains("the-src"));
        assert!(out.contains("the-box"));
        assert!(!out.contains("the-sink"));
        assert_eq!(out.lines().filter(|l| l.starts_with("NAME")).count(), 2);
    }

    #[test]
    fn test_all_tables_separated_by_blank_lines() {
        let agg = SnapshotAggregator::new();
        let out = agg.flush(&state(1));
        let headers: Vec<&str> = out.lines().collect();
        assert_eq!(headers.len(), 7);
        assert!(headers[0].starts_with("SENDER"));
        assert_eq!(headers[1], "");
        assert_eq!(headers[6], "NAME NTYPE STATE IN ERR");
    }

    #[test]
    fn test_malformed_record_is_rejected() {
        let agg = SnapshotAggregator::new();
        let err = agg.push(json!({"node_name": "x"})).unwrap_err();
        assert!(matches!(err, IotopError::Decode(_)));
        assert!(agg.current().timestamp.is_none());
    }

    #[test]
    fn test_concurrent_push_and_flush() {
        let agg = Arc::new(SnapshotAggregator::new());
        let writer = {
            let agg = agg.clone();
            std::thread::spawn(move || {
                for ts in 0..200 {
                    agg.push(source("a", ts * 10, ts)).unwrap();
                    agg.push(source("b", ts * 10, ts)).unwrap();
                }
            })
        };

        for _ in 0..200 {
            let out = agg.flush(&state(1));
            assert!(out.starts_with("SENDER"));
        }
        writer.join().unwrap();

        let out = agg.flush(&state(1));
        // Both snapshots are complete, so each row is rated at 10/s.
        assert_eq!(rows_of(&out, &["a ", "b "]).iter().filter(|r| r.contains("10.00")).count(), 2);
    }
}
