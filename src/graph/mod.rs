//! Graph module for managing the dataflow graph.
//!
//! The graph is a directed acyclic graph where nodes are variant instances
//! and links carry values from source ports to sink ports.

pub mod link;
pub mod structure;
pub mod topology;

// Re-export commonly used types
pub use link::Link;
pub use structure::{Graph, GraphNode};
pub use topology::TopologyAnalyzer;
