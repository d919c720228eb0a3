//! NodeVariant trait, node metadata and per-node propagation state.
//!
//! A node variant supplies its port specification, whether its compute is
//! synchronous or asynchronous, and the compute itself. The engine is
//! agnostic to variant identity beyond that contract.

use crate::core::context::ComputeContext;
use crate::core::error::{ComputeError, ComputeResult, NodeId};
use crate::core::port::{ParameterDefinition, PortKind, PortSpec};
use crate::core::types::Parameters;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category for organizing node variants in a palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Image sources
    Input,
    /// Terminal display nodes
    Output,
    /// Convolution filters
    Filter,
    /// Color adjustments
    Color,
    /// Constant values
    Constant,
    /// Arithmetic on numbers
    Math,
    /// Custom/user-defined
    #[default]
    Custom,
}

impl Category {
    /// Get the display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Input => "Input",
            Category::Output => "Output",
            Category::Filter => "Filter",
            Category::Color => "Color",
            Category::Constant => "Constant",
            Category::Math => "Math",
            Category::Custom => "Custom",
        }
    }
}

/// How a variant's compute is scheduled.
///
/// This is a static property of the variant, not a per-call choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    /// Cheap; runs inline on the coordinating thread.
    #[default]
    Synchronous,
    /// Expensive; runs on the worker pool.
    Asynchronous,
}

/// Metadata describing a node variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Unique identifier for this variant (e.g., "blur")
    pub id: String,
    /// Human-readable name (e.g., "Blur")
    pub name: String,
    /// Category for UI organization
    pub category: Category,
    /// Detailed description
    pub description: String,
    /// Port declarations, sinks and sources
    pub ports: Vec<PortSpec>,
    /// Parameter definitions
    pub parameters: Vec<ParameterDefinition>,
    /// Synchronous or asynchronous compute
    pub execution: Execution,
    /// Whether results may be memoized. False for variants that read
    /// external state, such as files.
    #[serde(default = "cacheable_default")]
    pub cacheable: bool,
}

fn cacheable_default() -> bool {
    true
}

impl NodeMetadata {
    /// Create a new metadata builder.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> NodeMetadataBuilder {
        NodeMetadataBuilder::new(id, name)
    }

    /// Sink port declarations.
    pub fn sinks(&self) -> impl Iterator<Item = &PortSpec> {
        self.ports.iter().filter(|p| p.kind == PortKind::Sink)
    }

    /// Source port declarations.
    pub fn sources(&self) -> impl Iterator<Item = &PortSpec> {
        self.ports.iter().filter(|p| p.kind == PortKind::Source)
    }

    /// Find a port declaration by name.
    pub fn get_port(&self, name: &str) -> Option<&PortSpec> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Find a parameter by name.
    pub fn get_parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Default value of every declared parameter.
    pub fn default_parameters(&self) -> Parameters {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.default_value.clone()))
            .collect()
    }

    pub fn is_asynchronous(&self) -> bool {
        self.execution == Execution::Asynchronous
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Check parameter values against their declared constraints.
    pub fn check_parameters(&self, node_id: NodeId, parameters: &Parameters) -> ComputeResult<()> {
        for definition in &self.parameters {
            if let Some(value) = parameters.get(&definition.name) {
                definition
                    .check(value)
                    .map_err(|reason| ComputeError::InvalidParameter {
                        node_id,
                        parameter: definition.name.clone(),
                        reason,
                    })?;
            }
        }
        Ok(())
    }
}

/// Builder for NodeMetadata.
pub struct NodeMetadataBuilder {
    metadata: NodeMetadata,
}

impl NodeMetadataBuilder {
    /// Create a new builder with required fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: NodeMetadata {
                id: id.into(),
                name: name.into(),
                category: Category::Custom,
                description: String::new(),
                ports: Vec::new(),
                parameters: Vec::new(),
                execution: Execution::Synchronous,
                cacheable: true,
            },
        }
    }

    /// Set the category.
    pub fn category(mut self, category: Category) -> Self {
        self.metadata.category = category;
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    /// Add a port.
    pub fn port(mut self, port: PortSpec) -> Self {
        self.metadata.ports.push(port);
        self
    }

    /// Add a parameter.
    pub fn parameter(mut self, param: ParameterDefinition) -> Self {
        self.metadata.parameters.push(param);
        self
    }

    /// Run compute on the worker pool.
    pub fn asynchronous(mut self) -> Self {
        self.metadata.execution = Execution::Asynchronous;
        self
    }

    /// Never memoize results of this variant.
    pub fn uncached(mut self) -> Self {
        self.metadata.cacheable = false;
        self
    }

    /// Build the metadata.
    pub fn build(self) -> NodeMetadata {
        self.metadata
    }
}

/// The contract every node variant implements.
///
/// # Compute
///
/// `compute` reads inputs and parameters from the context and sets one value
/// per declared source port. It must be pure: the same inputs and parameters
/// give the same outputs, and it has no side effects beyond returning them.
/// The engine relies on this to discard superseded background results and
/// to memoize expensive ones.
///
/// Required sinks without an upstream value are detected before `compute`
/// runs; optional sinks may simply be absent from the context.
///
/// # Thread Safety
///
/// `Send + Sync` lets asynchronous variants run on worker threads.
pub trait NodeVariant: Send + Sync {
    /// Get the metadata for this variant.
    ///
    /// Called when a node is created; should return consistent values.
    fn metadata(&self) -> NodeMetadata;

    /// Compute the outputs.
    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError>;
}

/// Propagation state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Cached outputs are valid for the current inputs.
    Clean,
    /// Inputs or parameters changed; recompute not yet started.
    Dirty,
    /// Background compute in flight for this generation.
    Computing(u64),
    /// A required input has no upstream value; compute withheld.
    Waiting,
    /// The last compute failed.
    Error,
}

impl NodeState {
    /// Whether the node still has work pending in the current wave.
    pub fn is_pending(&self) -> bool {
        matches!(self, NodeState::Dirty | NodeState::Computing(_))
    }

    /// Whether the node is at rest.
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Clean => write!(f, "clean"),
            NodeState::Dirty => write!(f, "dirty"),
            NodeState::Computing(generation) => write!(f, "computing(#{})", generation),
            NodeState::Waiting => write!(f, "waiting"),
            NodeState::Error => write!(f, "error"),
        }
    }
}
