//! Correlation of sender-side and receiver-side pipe reports.
//!
//! A pipe between two nodes is reported twice per snapshot: once in the
//! sender's `outputs` and once in the receiver's `inputs`. The two halves
//! arrive in separate records and are merged here into one [`Edge`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::feed::{NodeCategory, PipeStatus};

/// Identity of a pipe: the ordered (sender, receiver) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    pub sender: String,
    pub receiver: String,
}

impl EdgeKey {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
        }
    }
}

/// The pipe as seen from one end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSide {
    pub category: NodeCategory,
    pub pipe: PipeStatus,
}

/// Merged view of a pipe.
///
/// Either side may be missing until its node reports in the current
/// snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edge {
    pub sender: Option<EdgeSide>,
    pub receiver: Option<EdgeSide>,
    /// Received minus sent, once both sides are known.
    pub backlog: i64,
}

impl Edge {
    /// Recompute backlog from the latest known halves.
    ///
    /// The other half may be stale within a snapshot until its node reports.
    fn recompute_backlog(&mut self) {
        if let (Some(sender), Some(receiver)) = (&self.sender, &self.receiver) {
            self.backlog = receiver.pipe.count - sender.pipe.count;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.sender.is_some() && self.receiver.is_some()
    }
}

/// Edge map keyed by (sender, receiver).
#[derive(Debug, Clone, Default)]
pub struct EdgeCorrelator {
    edges: BTreeMap<EdgeKey, Edge>,
}

impl EdgeCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outbound pipes reported by `name`.
    pub fn set_source_side<'a, I>(&mut self, name: &str, category: NodeCategory, outputs: I)
    where
        I: IntoIterator<Item = (&'a str, PipeStatus)>,
    {
        for (receiver, pipe) in outputs {
            let edge = self.edges.entry(EdgeKey::new(name, receiver)).or_default();
            edge.sender = Some(EdgeSide { category, pipe });
            edge.recompute_backlog();
        }
    }

    /// Record the inbound pipes reported by `name`.
    ///
    /// If the sender has not reported yet, the edge is opened with only the
    /// receiver half; the backlog is filled in when the sender arrives.
    pub fn set_destination_side<'a, I>(&mut self, name: &str, category: NodeCategory, inputs: I)
    where
        I: IntoIterator<Item = (&'a str, PipeStatus)>,
    {
        for (sender, pipe) in inputs {
            let side = EdgeSide { category, pipe };
            match self.edges.entry(EdgeKey::new(sender, name)) {
                Entry::Occupied(mut entry) => {
                    let edge = entry.get_mut();
                    edge.receiver = Some(side);
                    edge.recompute_backlog();
                }
                Entry::Vacant(entry) => {
                    entry.insert(Edge {
                        receiver: Some(side),
                        ..Edge::default()
                    });
                }
            }
        }
    }

    pub fn get(&self, sender: &str, receiver: &str) -> Option<&Edge> {
        self.edges.get(&EdgeKey::new(sender, receiver))
    }

    pub fn get_by_key(&self, key: &EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    /// Edges ordered by sender, then receiver.
    pub fn iter(&self) -> impl Iterator<Item = (&EdgeKey, &Edge)> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
