//! Compute context handed to a node variant.
//!
//! The context is an owned snapshot: inputs and parameters are captured on
//! the coordinating thread when the compute is dispatched, so a background
//! compute never shares mutable state with the graph.

use crate::core::error::{ComputeError, ComputeResult, NodeId};
use crate::core::types::{Color, ImageValue, ParamValue, Parameters, PortType, Value};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Inputs, parameters and output slots of one compute.
#[derive(Debug, Clone)]
pub struct ComputeContext {
    /// ID of the node being computed.
    pub node_id: NodeId,
    /// Input values by sink port name.
    inputs: HashMap<String, Value>,
    /// Parameter values, defaults already applied.
    parameters: Parameters,
    /// Declared outputs by source port name.
    declared: IndexMap<String, PortType>,
    /// Output values set by the node.
    outputs: IndexMap<String, Value>,
}

impl ComputeContext {
    /// Create an empty context.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            inputs: HashMap::new(),
            parameters: Parameters::new(),
            declared: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    /// Replace the parameter snapshot.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Add an input value to the context.
    pub fn add_input(&mut self, name: impl Into<String>, value: Value) {
        self.inputs.insert(name.into(), value);
    }

    /// Declare a source port the compute must fill.
    pub fn declare_output(&mut self, name: impl Into<String>, port_type: PortType) {
        self.declared.insert(name.into(), port_type);
    }

    /// Get all inputs.
    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    /// Get all parameters.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    // ========================================================================
    // Input Getters
    // ========================================================================

    /// Get an input value by name.
    pub fn input(&self, name: &str) -> ComputeResult<&Value> {
        self.inputs.get(name).ok_or_else(|| ComputeError::MissingInput {
            node_id: self.node_id,
            port: name.to_string(),
        })
    }

    /// Check if an input exists.
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    /// Get an input as an image.
    pub fn input_image(&self, name: &str) -> ComputeResult<&ImageValue> {
        let value = self.input(name)?;
        value.as_image().ok_or_else(|| self.input_type_error(name, PortType::Image, value))
    }

    /// Get an input as a number.
    pub fn input_number(&self, name: &str) -> ComputeResult<f64> {
        let value = self.input(name)?;
        value.as_number().ok_or_else(|| self.input_type_error(name, PortType::Number, value))
    }

    /// Get an input as a color.
    pub fn input_color(&self, name: &str) -> ComputeResult<Color> {
        let value = self.input(name)?;
        value.as_color().ok_or_else(|| self.input_type_error(name, PortType::Color, value))
    }

    fn input_type_error(&self, name: &str, expected: PortType, got: &Value) -> ComputeError {
        ComputeError::Processing {
            node_id: self.node_id,
            reason: format!("input '{}' expects {}, got {}", name, expected, got.port_type()),
        }
    }

    // ========================================================================
    // Parameter Getters
    // ========================================================================

    /// Get a parameter value by name.
    pub fn parameter(&self, name: &str) -> ComputeResult<&ParamValue> {
        self.parameters
            .get(name)
            .ok_or_else(|| self.invalid_parameter(name, "parameter not set"))
    }

    /// Get a parameter as a float.
    pub fn number(&self, name: &str) -> ComputeResult<f64> {
        self.parameter(name)?
            .as_number()
            .ok_or_else(|| self.invalid_parameter(name, "expected a number"))
    }

    /// Get a parameter as an integer.
    pub fn integer(&self, name: &str) -> ComputeResult<i64> {
        self.parameter(name)?
            .as_integer()
            .ok_or_else(|| self.invalid_parameter(name, "expected an integer"))
    }

    /// Get a parameter as a string.
    pub fn text(&self, name: &str) -> ComputeResult<&str> {
        self.parameter(name)?
            .as_text()
            .ok_or_else(|| self.invalid_parameter(name, "expected text"))
    }

    /// Get a parameter as a boolean.
    pub fn boolean(&self, name: &str) -> ComputeResult<bool> {
        self.parameter(name)?
            .as_bool()
            .ok_or_else(|| self.invalid_parameter(name, "expected a boolean"))
    }

    /// Get a parameter as a color.
    pub fn color(&self, name: &str) -> ComputeResult<Color> {
        self.parameter(name)?
            .as_color()
            .ok_or_else(|| self.invalid_parameter(name, "expected a color"))
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// Build an `InvalidParameter` error for this node.
    pub fn invalid_parameter(&self, name: &str, reason: impl Into<String>) -> ComputeError {
        ComputeError::InvalidParameter {
            node_id: self.node_id,
            parameter: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Build a `Processing` error for this node.
    pub fn processing_error(&self, reason: impl Into<String>) -> ComputeError {
        ComputeError::Processing {
            node_id: self.node_id,
            reason: reason.into(),
        }
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Set an output value.
    ///
    /// Fails if the port is not a declared source or the value has the
    /// wrong type.
    pub fn set_output(&mut self, name: impl Into<String>, value: Value) -> ComputeResult<()> {
        let name = name.into();
        let expected = *self
            .declared
            .get(&name)
            .ok_or_else(|| self.processing_error(format!("'{}' is not a declared output", name)))?;

        if !expected.matches(&value) {
            return Err(ComputeError::OutputTypeMismatch {
                node_id: self.node_id,
                port: name,
                expected,
                got: value.port_type(),
            });
        }

        self.outputs.insert(name, value);
        Ok(())
    }

    /// Get an output value that has already been set.
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }

    /// Consume the context, returning outputs once every declared one is set.
    pub fn finish(self) -> ComputeResult<IndexMap<String, Value>> {
        if let Some(port) = self.declared.keys().find(|p| !self.outputs.contains_key(*p)) {
            return Err(ComputeError::OutputNotSet {
                node_id: self.node_id,
                port: port.clone(),
            });
        }
        Ok(self.outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input() {
        let ctx = ComputeContext::new(NodeId::new());
        let err = ctx.input_number("a").unwrap_err();
        assert!(err.is_missing_input());
    }

    #[test]
    fn test_parameter_getters() {
        let ctx = ComputeContext::new(NodeId::new())
            .with_parameters(Parameters::new().with("amount", 3i64).with("method", "box"));
        assert_eq!(ctx.number("amount").unwrap(), 3.0);
        assert_eq!(ctx.text("method").unwrap(), "box");
        assert!(matches!(
            ctx.boolean("method"),
            Err(ComputeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_outputs_are_checked() {
        let mut ctx = ComputeContext::new(NodeId::new());
        ctx.declare_output("value", PortType::Number);

        assert!(matches!(
            ctx.set_output("value", Value::Color(Color::WHITE)),
            Err(ComputeError::OutputTypeMismatch { .. })
        ));
        assert!(ctx.set_output("other", Value::Number(1.0)).is_err());
        assert!(matches!(
            ctx.clone().finish(),
            Err(ComputeError::OutputNotSet { .. })
        ));

        ctx.set_output("value", Value::Number(2.0)).unwrap();
        let outputs = ctx.finish().unwrap();
        assert_eq!(outputs.get("value"), Some(&Value::Number(2.0)));
    }
}
