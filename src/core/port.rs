//! Ports, port specifications and parameter definitions.
//!
//! A [`PortSpec`] is what a node variant declares; a [`Port`] is the
//! instantiated endpoint owned by one node in a graph.

use crate::core::error::NodeId;
use crate::core::types::{ParamValue, PortType, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a port in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId(pub Uuid);

impl PortId {
    /// Create a new random port ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PortId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Kind of a port: Source produces values, Sink consumes them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Source,
    Sink,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Source => f.write_str("source"),
            PortKind::Sink => f.write_str("sink"),
        }
    }
}

/// Declaration of a port on a node variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSpec {
    /// Unique name within the node
    pub name: String,
    /// Source or Sink
    pub kind: PortKind,
    /// Type of data this port carries
    pub port_type: PortType,
    /// Whether an unconnected sink still lets the node compute
    pub optional: bool,
    /// Value used for an unconnected optional sink
    pub default_value: Option<Value>,
    /// Description for documentation and tooltips
    pub description: String,
}

impl PortSpec {
    /// Declare an output port.
    pub fn source(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::Source,
            port_type,
            optional: false,
            default_value: None,
            description: String::new(),
        }
    }

    /// Declare a required input port.
    pub fn sink(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            kind: PortKind::Sink,
            ..Self::source(name, port_type)
        }
    }

    /// Mark the port optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark the port optional, falling back to `value` when unconnected.
    pub fn with_default(mut self, value: Value) -> Self {
        self.optional = true;
        self.default_value = Some(value);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A typed endpoint owned by exactly one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    /// Node that owns this port
    pub node_id: NodeId,
    pub name: String,
    pub kind: PortKind,
    pub port_type: PortType,
    pub optional: bool,
    pub default_value: Option<Value>,
}

impl Port {
    /// Instantiate a port from its declaration.
    pub fn from_spec(node_id: NodeId, spec: &PortSpec) -> Self {
        Self {
            id: PortId::new(),
            node_id,
            name: spec.name.clone(),
            kind: spec.kind,
            port_type: spec.port_type,
            optional: spec.optional,
            default_value: spec.default_value.clone(),
        }
    }

    pub fn is_source(&self) -> bool {
        self.kind == PortKind::Source
    }

    pub fn is_sink(&self) -> bool {
        self.kind == PortKind::Sink
    }
}

/// Whether `source` may feed `sink` at the port level.
///
/// Same-node pairs are allowed here; the graph's acyclicity check is what
/// rejects them.
pub fn connectable(source: &Port, sink: &Port) -> bool {
    source.is_source() && sink.is_sink() && source.port_type.compatible_with(&sink.port_type)
}

/// Definition of a node parameter.
///
/// Parameters are configured on the node rather than connected to other
/// nodes. Changing one invalidates the node exactly like an input change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Unique name within the node
    pub name: String,
    /// Value used until the parameter is set
    pub default_value: ParamValue,
    /// Description for documentation
    pub description: String,
    /// Constraints checked when the node computes
    pub constraints: Vec<Constraint>,
}

impl ParameterDefinition {
    /// Create a new parameter definition.
    pub fn new(name: impl Into<String>, default_value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            default_value: default_value.into(),
            description: String::new(),
            constraints: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Restrict a numeric parameter to `[min, max]`.
    pub fn with_range(self, min: f64, max: f64) -> Self {
        self.with_constraint(Constraint::Range { min, max })
    }

    /// Restrict a text parameter to a fixed set of choices.
    pub fn with_options<I, S>(self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_constraint(Constraint::OneOf(options.into_iter().map(Into::into).collect()))
    }

    /// Check a value against every constraint.
    pub fn check(&self, value: &ParamValue) -> Result<(), String> {
        self.constraints.iter().try_for_each(|c| c.check(value))
    }
}

/// Constraints that can be applied to parameter values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "params")]
pub enum Constraint {
    /// Numeric value must be within range [min, max]
    Range { min: f64, max: f64 },
    /// Text must be one of the listed options
    OneOf(Vec<String>),
    /// Text must not be empty
    NotEmpty,
}

impl Constraint {
    /// Check a value against this constraint.
    pub fn check(&self, value: &ParamValue) -> Result<(), String> {
        match self {
            Constraint::Range { min, max } => match value.as_number() {
                Some(n) if n >= *min && n <= *max => Ok(()),
                Some(n) => Err(format!("{} is outside [{}, {}]", n, min, max)),
                None => Err(format!("expected a number, got {}", value.kind_name())),
            },
            Constraint::OneOf(options) => match value.as_text() {
                Some(s) if options.iter().any(|o| o == s) => Ok(()),
                Some(s) => Err(format!("'{}' is not one of {:?}", s, options)),
                None => Err(format!("expected text, got {}", value.kind_name())),
            },
            Constraint::NotEmpty => match value.as_text() {
                Some(s) if !s.trim().is_empty() => Ok(()),
                _ => Err("value must not be empty".to_string()),
            },
        }
    }
}
