//! Links between ports.

use crate::core::port::PortId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A directed edge from one Source port to one Sink port.
///
/// A link is identified by its endpoints: a sink accepts at most one
/// incoming link, so `(source, sink)` is unique within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Source endpoint (output port).
    pub source: PortId,
    /// Sink endpoint (input port).
    pub sink: PortId,
}

impl Link {
    /// Create a new link.
    pub fn new(source: PortId, sink: PortId) -> Self {
        Self { source, sink }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.sink)
    }
}
