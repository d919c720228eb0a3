//! Error types for Vortex.
//!
//! Structural errors ([`GraphError`]) are returned synchronously from graph
//! mutations and never leave the graph half-modified. Compute errors
//! ([`ComputeError`]) are caught per recompute, stored on the failing node
//! and delivered to observers.

use crate::core::port::{PortId, PortKind};
use crate::core::types::PortType;
use crate::graph::link::Link;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a node ID from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type for Vortex.
#[derive(Error, Debug)]
pub enum VortexError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Other(String),
}

/// Errors related to graph structure and mutation.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphError {
    #[error("Node {0} not found")]
    UnknownNode(NodeId),

    #[error("Port {0} not found")]
    UnknownPort(PortId),

    #[error("Port '{port}' not found on node {node_id}")]
    PortNotFound { node_id: NodeId, port: String },

    #[error("A link must run from a source to a sink, got {from_kind} -> {to_kind}")]
    InvalidEndpoints { from_kind: PortKind, to_kind: PortKind },

    #[error("Cannot connect {from_type} to {to_type}")]
    TypeMismatch { from_type: PortType, to_type: PortType },

    #[error("Sink {sink} is already fed by {existing}")]
    SinkOccupied { sink: PortId, existing: Link },

    #[error("Connecting node {from} to node {to} would create a cycle")]
    WouldCreateCycle { from: NodeId, to: NodeId },

    #[error("Node {0} is already in the graph")]
    DuplicateNode(NodeId),

    #[error("Port {0} already belongs to a node in the graph")]
    DuplicatePort(PortId),

    #[error("Cycle detected among {} node(s)", nodes.len())]
    CycleDetected { nodes: Vec<NodeId> },

    #[error("Node {node_id} has no parameter '{name}'")]
    UnknownParameter { node_id: NodeId, name: String },

    #[error("Parameter '{name}' on node {node_id} expects {expected}, got {got}")]
    ParameterTypeMismatch {
        node_id: NodeId,
        name: String,
        expected: String,
        got: String,
    },
}

/// Errors produced while computing a node.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComputeError {
    #[error("Missing input '{port}' for node {node_id}")]
    MissingInput { node_id: NodeId, port: String },

    #[error("Invalid parameter '{parameter}' on node {node_id}: {reason}")]
    InvalidParameter {
        node_id: NodeId,
        parameter: String,
        reason: String,
    },

    #[error("Cannot read {resource} for node {node_id}: {reason}")]
    Resource {
        node_id: NodeId,
        resource: String,
        reason: String,
    },

    #[error("Node {node_id} failed: {reason}")]
    Processing { node_id: NodeId, reason: String },

    #[error("Output '{port}' was not set by node {node_id}")]
    OutputNotSet { node_id: NodeId, port: String },

    #[error("Output '{port}' of node {node_id} expects {expected}, got {got}")]
    OutputTypeMismatch {
        node_id: NodeId,
        port: String,
        expected: PortType,
        got: PortType,
    },

    #[error("Node {node_id} panicked: {message}")]
    Panicked { node_id: NodeId, message: String },
}

// ============================================================================
// Error Utilities
// ============================================================================

impl GraphError {
    /// Get the node this error is about, if it names one.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            GraphError::UnknownNode(node_id)
            | GraphError::DuplicateNode(node_id)
            | GraphError::PortNotFound { node_id, .. }
            | GraphError::UnknownParameter { node_id, .. }
            | GraphError::ParameterTypeMismatch { node_id, .. } => Some(*node_id),
            GraphError::WouldCreateCycle { to, .. } => Some(*to),
            _ => None,
        }
    }
}

impl ComputeError {
    /// Get the node that failed.
    pub fn node_id(&self) -> NodeId {
        match self {
            ComputeError::MissingInput { node_id, .. }
            | ComputeError::InvalidParameter { node_id, .. }
            | ComputeError::Resource { node_id, .. }
            | ComputeError::Processing { node_id, .. }
            | ComputeError::OutputNotSet { node_id, .. }
            | ComputeError::OutputTypeMismatch { node_id, .. }
            | ComputeError::Panicked { node_id, .. } => *node_id,
        }
    }

    /// Whether this error only reports an absent input.
    pub fn is_missing_input(&self) -> bool {
        matches!(self, ComputeError::MissingInput { .. })
    }
}

/// Result type alias for Vortex operations.
pub type VortexResult<T> = Result<T, VortexError>;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for compute operations.
pub type ComputeResult<T> = Result<T, ComputeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new();
        assert_eq!(format!("{}", id).len(), 8);
    }

    #[test]
    fn test_type_mismatch_message() {
        let error = GraphError::TypeMismatch {
            from_type: PortType::Number,
            to_type: PortType::Image,
        };
        assert_eq!(error.to_string(), "Cannot connect Number to Image");
        assert_eq!(error.node_id(), None);
    }

    #[test]
    fn test_compute_error_node() {
        let node_id = NodeId::new();
        let error = ComputeError::MissingInput {
            node_id,
            port: "image".to_string(),
        };
        assert!(error.is_missing_input());
        assert_eq!(error.node_id(), node_id);

        let wrapped: VortexError = error.into();
        assert!(wrapped.to_string().contains("image"));
    }
}
