//! Core types and traits for the Vortex dataflow engine.
//!
//! This module contains the foundational types that make up the graph:
//! - Value types (Image, Number, Color) and node parameters
//! - Ports, port specifications and parameter definitions
//! - Node variant trait, metadata and propagation state
//! - Error types
//! - The compute context

pub mod types;
pub mod port;
pub mod error;
pub mod context;
pub mod node;

// Re-export commonly used types
pub use types::{Value, PortType, ImageValue, Color, ParamValue, Parameters};
pub use port::{Port, PortId, PortKind, PortSpec, ParameterDefinition, Constraint, connectable};
pub use error::{VortexError, GraphError, ComputeError, NodeId};
pub use context::ComputeContext;
pub use node::{NodeVariant, NodeMetadata, NodeState, Category, Execution};
