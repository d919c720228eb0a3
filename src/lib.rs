//! # Vortex - Reactive Node-based Image Editing
//!
//! Vortex is the dataflow engine behind a node-based image editor. Nodes
//! (image source, blur, brightness, sepia, output, ...) are wired through
//! typed ports, and every change to a node's inputs or parameters is
//! propagated downstream until every cached output agrees with its inputs.
//!
//! ## Features
//!
//! - **Typed Ports**: Links only join ports of the same type; the check is
//!   made once, when the link is created
//! - **Cycle-safe Wiring**: Every mutation is validated up front and either
//!   applied completely or rejected
//! - **Background Computes**: Expensive nodes run on a worker pool; results
//!   superseded by a newer change are discarded, never applied
//! - **Extensible**: Add node variants through the `NodeVariant` trait
//! - **Caching**: Background results are memoized by variant, parameters
//!   and input content
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vortex::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = NodeRegistry::with_builtins();
//! let mut engine = Engine::new()?;
//!
//! let source = GraphNode::new(registry.create("image_source").ok_or("missing variant")?)
//!     .with_parameter("path", "input.png");
//! let source = engine.add_graph_node(source)?;
//! let blur = engine.add_node(registry.create("blur").ok_or("missing variant")?);
//! let output = engine.add_node(registry.create("image_output").ok_or("missing variant")?);
//!
//! engine.connect_ports(source, "image", blur, "image")?;
//! engine.connect_ports(blur, "result", output, "image")?;
//!
//! // Changing a parameter recomputes the blur and everything downstream
//! engine.set_parameter(blur, "method", "gaussian5")?;
//! engine.wait_until_idle(Duration::from_secs(10));
//!
//! let preview = engine.cached_output(output, "preview");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: Value types, ports, the node variant contract and errors
//! - [`graph`]: Graph structure and topology analysis
//! - [`execution`]: The propagation engine, worker pool, cache and events
//! - [`filters`]: Variant registry and built-in nodes

#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod filters;
pub mod graph;

/// Prelude module for convenient imports.
///
/// ```rust
/// use vortex::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{Color, ImageMetadata, ImageValue, ParamValue, Parameters, PortType, Value};

    // Node contract
    pub use crate::core::node::{Category, Execution, NodeMetadata, NodeState, NodeVariant};

    // Ports
    pub use crate::core::port::{Constraint, ParameterDefinition, Port, PortId, PortKind, PortSpec};

    // Context
    pub use crate::core::context::ComputeContext;

    // Errors
    pub use crate::core::error::{ComputeError, GraphError, NodeId, VortexError, VortexResult};

    // Graph
    pub use crate::graph::link::Link;
    pub use crate::graph::structure::{Graph, GraphNode};
    pub use crate::graph::topology::TopologyAnalyzer;

    // Execution
    pub use crate::execution::cache::{CacheStats, ResultCache};
    pub use crate::execution::engine::{Engine, EngineOptions, EngineStats};
    pub use crate::execution::events::{ChannelObserver, GraphObserver, LoggingObserver, NodeEvent, ObserverId};

    // Variants
    pub use crate::filters::builtin::{
        Blur, BlurMethod, Brightness, ColorConstant, ImageOutput, ImageSource, Math, MathMethod,
        NumberConstant, Sepia,
    };
    pub use crate::filters::registry::NodeRegistry;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
