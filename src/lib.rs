//! # sensorbee-iotop
//!
//! A live terminal dashboard for the I/O graph of a SensorBee topology.
//!
//! Every node of a running topology periodically reports its throughput,
//! queue and error counters together with the pipes connecting it to its
//! peers. This crate collects those reports into snapshots, diffs successive
//! snapshots into per-second rates, and renders them as aligned tables that
//! refresh on an interval and can be reconfigured from the keyboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Session                            │
//! │  ┌─────────┐    ┌────────────┐    ┌──────────┐   ┌────────┐  │
//! │  │  feed   │───▶│   ingest   │───▶│   data   │──▶│ render │  │
//! │  │ (input) │    │   (task)   │    │(snapshot)│   │ (task) │  │
//! │  └─────────┘    └────────────┘    └──────────┘   └───┬────┘  │
//! │                                                      │       │
//! │  ┌─────────┐    ┌────────────┐   pause / resume      ▼       │
//! │  │  keys   │───▶│  commands  │──────────────────▶ Screen     │
//! │  │ (events)│    │ (+ editor) │                    (ui)       │
//! │  └─────────┘    └────────────┘                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`feed`]**: Node status records from the SensorBee HTTP API or a
//!   newline-delimited JSON stream
//! - **[`data`]**: Snapshot aggregation, edge correlation and table rendering
//! - **[`app`]**: The session: ingest, render and input loops with a
//!   pause/resume handshake
//! - **[`ui`]**: Terminal drawing, the prompt line editor, and themes
//! - **[`settings`]**: Layered configuration (defaults, file, env, CLI)
//!
//! ## Usage
//!
//! ```bash
//! # Watch topology "demo" on a local server, refreshing every 2 seconds
//! sensorbee-iotop --topology demo --interval 2
//!
//! # Read records relayed over TCP, one JSON object per line
//! sensorbee-iotop --connect localhost:9090
//! ```
//!
//! Keys: `d` change the interval, `c` toggle rates and totals, `u` choose
//! the node categories to show, `q` quit.
//!
//! ### As a library
//!
//! ```
//! use std::time::Duration;
//! use sensorbee_iotop::{MonitoringState, SnapshotAggregator, Visibility};
//!
//! let aggregator = SnapshotAggregator::new();
//! aggregator
//!     .push(serde_json::json!({
//!         "node_name": "src",
//!         "node_type": "source",
//!         "state": "running",
//!         "output_stats": {"num_sent_total": 42, "num_dropped": 0, "outputs": {}},
//!         "ts": 1
//!     }))
//!     .unwrap();
//!
//! let state = MonitoringState::new(Duration::from_secs(5))
//!     .with_visibility(Visibility::parse("src").unwrap());
//! assert!(aggregator.flush(&state).contains("[42]"));
//! ```

pub mod app;
pub mod data;
pub mod error;
pub mod events;
pub mod feed;
pub mod logging;
pub mod settings;
pub mod ui;

// Re-export main types for convenience
pub use app::Session;
pub use data::{DisplayMode, EdgeCorrelator, MonitoringState, SnapshotAggregator, Visibility};
pub use error::IotopError;
pub use events::KeyEvents;
pub use feed::{Feed, NodeCategory, NodeStatus, PipeStatus, StatusRequester};
pub use settings::{CliOverrides, DecodePolicy, Settings};
pub use ui::{LineEditor, Theme};
