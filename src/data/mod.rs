//! Aggregation of node status records into renderable snapshots.
//!
//! ## Submodules
//!
//! - [`aggregator`]: Double-buffered snapshots and text rendering ([`SnapshotAggregator`])
//! - [`edge`]: Merging of sender/receiver pipe reports ([`EdgeCorrelator`])
//! - [`lines`]: Per-category node rows
//! - [`state`]: Interval, display mode and table filter ([`MonitoringState`])
//! - [`table`]: Column-aligned text tables
//!
//! ## Data Flow
//!
//! ```text
//! node status record (raw JSON)
//!        │
//!        ▼
//! SnapshotAggregator::push()
//!        │
//!        ├──▶ new timestamp? current ──▶ previous
//!        │
//!        └──▶ Snapshot::apply() ──▶ SourceLine / BoxLine / SinkLine
//!                                └─▶ EdgeCorrelator
//!
//! SnapshotAggregator::flush(&MonitoringState) ──▶ aligned text
//! ```

pub mod aggregator;
pub mod edge;
pub mod lines;
pub mod state;
pub mod table;

pub use aggregator::{Snapshot, SnapshotAggregator};
pub use edge::{Edge, EdgeCorrelator, EdgeKey, EdgeSide};
pub use lines::{BoxLine, SinkLine, SourceLine};
pub use state::{parse_interval, DisplayMode, MonitoringState, Visibility, MIN_INTERVAL};
pub use table::TextTable;
